//! # Score Module
//!
//! Turn parsed notation into an [`ExecutableScore`]: absolute-timed note,
//! controller and system events ready for the scheduler.
//!
//! ## Sub-modules
//! - `types` - ExecutableScore, NoteEvent, CCEvent, SystemEvent definitions
//! - `translate` - ParsedNote list to ExecutableScore
//!
//! ## Example
//! ```rust
//! use maestro::notation::parse;
//! use maestro::score::translate;
//! use maestro::GlobalDefaults;
//!
//! let outcome = parse("C4:q [Am]:h", &GlobalDefaults::default()).unwrap();
//! let score = translate(&outcome);
//!
//! assert_eq!(score.notes.len(), 4);
//! assert_eq!(score.notes[0].midi, 60);
//! assert!(score.notes.iter().all(|n| n.note_off_time >= n.absolute_time));
//! ```

mod translate;
mod types;

pub use translate::{translate, translate_notes, voice_channel, REVERB_CONTROLLER};
pub use types::{CCEvent, ExecutableScore, NoteEvent, ScoreMetadata, SystemEvent, SystemMessage};
