//! Executable score type definitions
//!
//! These are the scheduler's input: every event carries an absolute time in
//! seconds from the start of the score.

use serde::Serialize;

use crate::notation::Articulation;

/// A note ready for dispatch.
///
/// # Fields
/// - `absolute_time`: note-on time, seconds
/// - `duration`: sounding length in seconds (written length x articulation)
/// - `note_off_time`: `absolute_time + duration`, never earlier than the note-on
/// - `velocity`: normalized 0..1
/// - `channel`: 1-16
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    pub absolute_time: f64,
    pub tone: String,
    pub midi: u8,
    pub velocity: f64,
    pub duration: f64,
    pub channel: u8,
    pub articulation: Articulation,
    pub note_off_time: f64,
}

impl NoteEvent {
    /// Velocity on the 0-127 wire scale.
    pub fn midi_velocity(&self) -> u8 {
        (self.velocity * 127.0).round().clamp(0.0, 127.0) as u8
    }
}

/// Continuous-controller change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CCEvent {
    pub absolute_time: f64,
    pub controller: u8,
    pub value: u8,
    pub channel: u8,
}

/// Payload of a system event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SystemMessage {
    TempoChange { bpm: f64 },
    TimeSignatureChange { signature: String },
    ProgramChange { program: u8 },
    /// Panic path; never produced by translation
    AllNotesOff,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
    pub absolute_time: f64,
    #[serde(flatten)]
    pub message: SystemMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub bpm: f64,
    pub time_signature: String,
    pub key: String,
    /// Seconds until the last note (or trailing rest) ends
    pub total_duration: f64,
    pub event_count: usize,
}

/// Fully time-stamped, type-partitioned event batch.
///
/// Built once per playback request and not modified after it is scheduled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableScore {
    pub metadata: ScoreMetadata,
    pub notes: Vec<NoteEvent>,
    pub cc_events: Vec<CCEvent>,
    pub system_events: Vec<SystemEvent>,
}

impl ExecutableScore {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.cc_events.is_empty() && self.system_events.is_empty()
    }

    /// Dispatch points the scheduler will register: two per note, one per
    /// CC or system event.
    pub fn dispatch_count(&self) -> usize {
        self.notes.len() * 2 + self.cc_events.len() + self.system_events.len()
    }
}
