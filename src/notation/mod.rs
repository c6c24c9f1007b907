//! # Notation Module
//!
//! Parse the compact hybrid notation into an ordered list of timed notes.
//!
//! ## Grammar
//! ```text
//! notation := front-matter? voice-line*
//! voice    := ("V" n ":")? measure ("|" measure)*
//! measure  := token (whitespace token)*
//! token    := PITCH (":" DURATION)? ("@" VELOCITY)? ("." ARTICULATION)?
//! PITCH    := note | "R" | "[" chord-symbol ("/" bass)? "]" | "[" note (" " note)* "]"
//! ```
//!
//! Examples: `C4:q`, `F#3:e@0.9.stac`, `[Cmaj7]:h`, `[Am/E]:q@mf`,
//! `[C4 E4 G4]:w.legato`, `R:h`.
//!
//! ## Sub-modules
//! - `durations` - duration codes and time signatures
//! - `pitch` - note names to MIDI numbers
//! - `chords` - chord symbol expansion with inversions and voicings
//! - `tokenizer` - front matter, voices, measures, bracket-aware tokens
//! - `metadata` - YAML front matter overrides
//! - `parser` - token decoding and timing
//! - `effects` - swing, transpose, reverb, velocity normalization
//!
//! ## Entry Points
//! - [`parse()`] - notation to [`ParseOutcome`]
//! - [`apply_swing()`] / [`apply_effects()`] - post-processing
//!
//! ## Example
//! ```rust
//! use maestro::notation::parse;
//! use maestro::GlobalDefaults;
//!
//! let outcome = parse("C4:q [C]:h | G3:w", &GlobalDefaults::default()).unwrap();
//!
//! assert_eq!(outcome.notes.len(), 3);
//! assert_eq!(outcome.notes[0].midi, Some(60));
//! assert!(outcome.notes[1].is_chord);
//! assert_eq!(outcome.notes[2].measure, 1);
//! ```

mod chords;
mod durations;
mod effects;
mod metadata;
mod parser;
mod pitch;
mod tokenizer;
mod types;


pub use chords::{chord_intervals, expand_chord, ChordSymbol};
pub use durations::{beats_to_seconds, DurationCode, NoteDuration, TimeSignature};
pub use effects::{apply_effects, apply_swing, normalize_velocity, EffectOptions};
pub use metadata::{apply_front_matter, FrontMatter};
pub use parser::parse;
pub use pitch::{clamp_midi, midi_to_name, parse_pitch};
pub use tokenizer::{split_measures, split_tokens, MEASURE_DELIMITER};
pub use types::{
    Articulation, ChordTone, Diagnostic, DiagnosticKind, GlobalDefaults, ParseOutcome,
    ParsedNote, Voicing, MAX_BPM, MIN_BPM,
};
