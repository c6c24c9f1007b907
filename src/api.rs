//! # Public API
//!
//! Entry points from notation text to playable output.
//!
//! - [`parse_hybrid_notation()`] - parse, then apply swing and reverb from the
//!   effective defaults
//! - [`compile()`] - the above, translated into an [`ExecutableScore`]
//! - [`compile_with_effects()`] - extra transpose/reverb on top of the defaults
//!
//! ## Typical Usage
//!
//! ```rust
//! use maestro::{compile, GlobalDefaults};
//!
//! let score = compile("C4:q D4:e E4:h", &GlobalDefaults::default())?;
//! assert_eq!(score.notes.len(), 3);
//! assert_eq!(score.metadata.bpm, 120.0);
//! # Ok::<(), maestro::NotationError>(())
//! ```
//!
//! Stylistic problems never fail these calls; they are returned as
//! diagnostics:
//!
//! ```rust
//! use maestro::{parse_hybrid_notation, GlobalDefaults};
//!
//! let outcome = parse_hybrid_notation("C4:q D4:x E4:h", &GlobalDefaults::default())?;
//! assert_eq!(outcome.notes.len(), 2);
//! assert_eq!(outcome.diagnostics.len(), 1);
//! # Ok::<(), maestro::NotationError>(())
//! ```

use crate::notation::{apply_effects, apply_swing, parse, EffectOptions, ParseOutcome, ParsedNote};
use crate::score::{translate, ExecutableScore};
use crate::{GlobalDefaults, NotationError};

/// Parse notation and apply the swing and reverb of the effective defaults
/// (after front matter). Notes stay ordered by time, then voice.
///
/// # Errors
/// Returns [`NotationError`] for structural problems: invalid pitch, octave,
/// chord symbol, time signature, or front matter.
pub fn parse_hybrid_notation(
    notation: &str,
    defaults: &GlobalDefaults,
) -> Result<ParseOutcome, NotationError> {
    let mut outcome = parse(notation, defaults)?;
    let effects = EffectOptions {
        transpose: None,
        reverb: Some(outcome.defaults.reverb),
    };
    finish(&mut outcome, &effects);
    Ok(outcome)
}

/// Compile notation into an [`ExecutableScore`] ready for scheduling.
///
/// # Example
/// ```rust
/// use maestro::{compile, GlobalDefaults};
///
/// let score = compile("[C]:h R:h | G3:w", &GlobalDefaults::default())?;
/// // three chord tones plus G3; the rest produces nothing
/// assert_eq!(score.notes.len(), 4);
/// assert_eq!(score.metadata.total_duration, 4.0);
/// # Ok::<(), maestro::NotationError>(())
/// ```
pub fn compile(notation: &str, defaults: &GlobalDefaults) -> Result<ExecutableScore, NotationError> {
    let outcome = parse_hybrid_notation(notation, defaults)?;
    Ok(translate(&outcome))
}

/// Compile with an additional transpose and reverb on top of the defaults.
///
/// The reverb given here replaces the configured one, for the articulation
/// lengthening and for the reverb send in the score.
pub fn compile_with_effects(
    notation: &str,
    defaults: &GlobalDefaults,
    effects: &EffectOptions,
) -> Result<ExecutableScore, NotationError> {
    let mut outcome = parse(notation, defaults)?;
    if let Some(reverb) = effects.reverb {
        outcome.defaults.reverb = reverb.max(0.0);
    }
    let effects = EffectOptions {
        transpose: effects.transpose,
        reverb: Some(outcome.defaults.reverb),
    };
    finish(&mut outcome, &effects);
    Ok(translate(&outcome))
}

fn finish(outcome: &mut ParseOutcome, effects: &EffectOptions) {
    apply_swing(&mut outcome.notes, outcome.defaults.swing);
    let mut notes = apply_effects(&outcome.notes, effects);
    sort_notes(&mut notes);
    outcome.notes = notes;
}

// swing can move a note past a later one in another voice
fn sort_notes(notes: &mut [ParsedNote]) {
    notes.sort_by(|a, b| {
        a.absolute_time
            .total_cmp(&b.absolute_time)
            .then(a.voice.cmp(&b.voice))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resilient_parse() {
        let outcome = parse_hybrid_notation("C4:q D4:x E4:h", &GlobalDefaults::default()).unwrap();
        let midi: Vec<Option<u8>> = outcome.notes.iter().map(|n| n.midi).collect();
        assert_eq!(midi, vec![Some(60), Some(64)]);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_invalid_pitch_fails() {
        let err = parse_hybrid_notation("H4:q", &GlobalDefaults::default()).unwrap_err();
        assert!(matches!(err, NotationError::InvalidPitch { .. }));
    }

    #[test]
    fn test_swing_from_defaults() {
        let defaults = GlobalDefaults {
            swing: 0.5,
            ..GlobalDefaults::default()
        };
        let outcome = parse_hybrid_notation("C4:e D4:e E4:q", &defaults).unwrap();
        // D4 is off-beat: 0.25s + 0.25 * 0.5 * 0.5
        assert_relative_eq!(outcome.notes[1].absolute_time, 0.3125);
        assert_relative_eq!(outcome.notes[2].absolute_time, 0.5);
    }

    #[test]
    fn test_reverb_lengthens_and_sends() {
        let defaults = GlobalDefaults {
            reverb: 0.5,
            ..GlobalDefaults::default()
        };
        let plain = compile("C4:q.stac", &GlobalDefaults::default()).unwrap();
        let wet = compile("C4:q.stac", &defaults).unwrap();
        assert!(wet.notes[0].duration > plain.notes[0].duration);
        assert_eq!(wet.cc_events.len(), 1);
        assert_eq!(wet.cc_events[0].value, 64);
        assert!(plain.cc_events.is_empty());
    }

    #[test]
    fn test_compile_with_effects_transposes() {
        let effects = EffectOptions {
            transpose: Some(5),
            reverb: None,
        };
        let score = compile_with_effects("G9:q C4:q", &GlobalDefaults::default(), &effects).unwrap();
        let midi: Vec<u8> = score.notes.iter().map(|n| n.midi).collect();
        assert_eq!(midi, vec![127, 65]);
    }

    #[test]
    fn test_front_matter_tempo_reaches_score() {
        let score = compile("---\ntempo: 60\n---\nC4:q D4:q", &GlobalDefaults::default()).unwrap();
        assert_eq!(score.metadata.bpm, 60.0);
        assert_relative_eq!(score.notes[1].absolute_time, 1.0);
    }
}
