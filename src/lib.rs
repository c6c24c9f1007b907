//! Maestro turns a compact hybrid music notation into timed MIDI events and
//! dispatches them on a shared timeline.
//!
//! ```text
//! notation ─parse─▶ ParseOutcome ─translate─▶ ExecutableScore ─schedule─▶ listeners / MidiSink
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod maestro;
pub mod notation;
pub mod scheduler;
pub mod score;
pub mod sink;
pub mod timeline;
pub mod transport;

pub use api::{compile, compile_with_effects, parse_hybrid_notation};
pub use config::{LatencyConfig, MaestroConfig, TimingConfig};
pub use error::*;
pub use events::{EventManager, EventStatus, ListenerId, NotePhase};
pub use maestro::{Maestro, SystemStatus};
pub use notation::{
    Articulation, Diagnostic, DiagnosticKind, EffectOptions, GlobalDefaults, ParseOutcome,
    ParsedNote, TimeSignature, Voicing,
};
pub use scheduler::{LatencyStats, PlaybackId, ScoreEvent, Scheduler, SchedulerStatus};
pub use score::{
    translate, CCEvent, ExecutableScore, NoteEvent, ScoreMetadata, SystemEvent, SystemMessage,
};
pub use sink::{LoggingSink, MidiMessage, MidiSink, RecordingSink, SinkBridge};
pub use timeline::{
    select_timeline, EngineTimeline, ManualTimeline, NativeTimeline, Timeline, TimelineKind,
    TimerId,
};
pub use transport::{Transport, TransportState, TransportStatus};
