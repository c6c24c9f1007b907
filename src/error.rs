//! # Error Types
//!
//! Maestro separates failures into two tiers:
//!
//! - **Terminal errors** ([`NotationError`]) abort a whole parse. They are
//!   structural: an unknown pitch letter, an octave outside 0-10, a chord
//!   symbol that cannot be resolved, or an unusable time signature. Each one
//!   names the offending token and the (1-indexed) measure it lives in.
//! - **Diagnostics** ([`crate::Diagnostic`]) are stylistic problems such as an
//!   unknown duration code. They never fail the parse; they are collected in
//!   the [`crate::ParseOutcome`] and logged as warnings.
//!
//! ## Usage
//! ```rust
//! use maestro::{parse_hybrid_notation, GlobalDefaults, NotationError};
//!
//! match parse_hybrid_notation("C4:q H4:q", &GlobalDefaults::default()) {
//!     Ok(outcome) => println!("{} notes", outcome.notes.len()),
//!     Err(NotationError::InvalidPitch { token, measure, .. }) => {
//!         eprintln!("bad pitch '{}' in measure {}", token, measure);
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotationError {
    /// Pitch letter or accidental could not be decoded.
    ///
    /// # Example
    /// ```
    /// # use maestro::NotationError;
    /// let err = NotationError::InvalidPitch {
    ///     token: "H4:q".to_string(),
    ///     measure: 2,
    ///     message: "'H' is not a pitch letter".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "Invalid pitch in token 'H4:q' (measure 2): 'H' is not a pitch letter");
    /// ```
    #[error("Invalid pitch in token '{token}' (measure {measure}): {message}")]
    InvalidPitch {
        token: String,
        measure: usize,
        message: String,
    },

    #[error("Octave {octave} out of range 0-10 in token '{token}' (measure {measure})")]
    OctaveOutOfRange {
        token: String,
        measure: usize,
        octave: i32,
    },

    #[error("Invalid chord '{token}' (measure {measure}): {message}")]
    InvalidChord {
        token: String,
        measure: usize,
        message: String,
    },

    #[error("Invalid time signature '{0}': expected N/D with N in 1-32 and D a power of two up to 32")]
    InvalidTimeSignature(String),

    /// Front matter could not be read or holds an unusable value.
    #[error("Invalid metadata: {0}")]
    Metadata(String),
}

/// Errors raised by a downstream MIDI sink while writing an event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("MIDI port is not connected")]
    Disconnected,

    #[error("MIDI write failed: {0}")]
    Write(String),
}

/// Timeline backend could not be brought up.
///
/// These never reach callers of [`crate::Maestro::initialize`]: a failed
/// engine start falls back to the native timer backend.
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Failed to spawn clock thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Clock thread not ready after {0:?}")]
    StartupTimeout(std::time::Duration),

    #[error("Clock thread exited during startup")]
    Stopped,

    #[error("No tokio runtime available for native timers")]
    NoRuntime,
}

/// Orchestrator lifecycle and configuration errors.
#[derive(Error, Debug)]
pub enum MaestroError {
    #[error("Maestro is not initialized; call initialize() first")]
    NotInitialized,

    #[error(transparent)]
    Notation(#[from] NotationError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
