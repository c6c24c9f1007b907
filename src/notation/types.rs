//! Notation type definitions
//!
//! Defaults record, parsed-note shape, and the diagnostics returned next to
//! the parsed notes.

use serde::{Deserialize, Serialize};

use super::durations::TimeSignature;
use crate::error::NotationError;

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;

/// Chord voicing applied to named chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voicing {
    /// Stacked tones inside one octave
    #[default]
    Close,
    /// Second tone raised an octave
    Open,
    /// Second-highest tone dropped an octave
    Drop2,
}

/// Fallback values for tokens that omit them.
///
/// Immutable for the duration of one parse. Front matter in the notation
/// string produces a modified copy, never mutates the caller's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GlobalDefaults {
    /// Quarter-note beats per minute (20-300)
    pub bpm: f64,
    /// Normalized velocity 0..1
    pub velocity: f64,
    /// Articulation (gate) weight 0..1
    pub articulation: f64,
    /// "N/D"
    pub time_signature: String,
    /// Swing amount 0..1
    pub swing: f64,
    /// Reverb amount 0..1
    pub reverb: f64,
    /// Semitones
    pub transpose: i32,
    pub key: String,
    pub program: Option<u8>,
    /// MIDI channel (1-16) for voice 1
    pub channel: u8,
    pub voicing: Voicing,
    /// Octave that named chords are rooted in
    pub chord_octave: i32,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            velocity: 0.7,
            articulation: 0.8,
            time_signature: "4/4".to_string(),
            swing: 0.0,
            reverb: 0.0,
            transpose: 0,
            key: "C".to_string(),
            program: None,
            channel: 1,
            voicing: Voicing::Close,
            chord_octave: 4,
        }
    }
}

impl GlobalDefaults {
    /// Check the values a parse cannot run without.
    ///
    /// Returns the decoded time signature so callers don't parse it twice.
    pub fn validate(&self) -> Result<TimeSignature, NotationError> {
        if !(MIN_BPM..=MAX_BPM).contains(&self.bpm) {
            return Err(NotationError::Metadata(format!(
                "bpm {} outside {}-{}",
                self.bpm, MIN_BPM, MAX_BPM
            )));
        }
        if !(1..=16).contains(&self.channel) {
            return Err(NotationError::Metadata(format!(
                "channel {} outside 1-16",
                self.channel
            )));
        }
        if !(0..=10).contains(&self.chord_octave) {
            return Err(NotationError::Metadata(format!(
                "chord-octave {} outside 0-10",
                self.chord_octave
            )));
        }
        TimeSignature::parse(&self.time_signature)
    }

    /// Seconds per quarter-note beat
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }
}

/// Performance style attached to a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Articulation {
    Legato,
    Tenuto,
    Normal,
    Portato,
    Staccato,
    Staccatissimo,
    Accent,
    Marcato,
}

impl Articulation {
    /// Category for a bare gate weight.
    pub fn from_weight(weight: f64) -> Self {
        if weight >= 0.98 {
            Articulation::Legato
        } else if weight >= 0.9 {
            Articulation::Tenuto
        } else if weight >= 0.8 {
            Articulation::Normal
        } else if weight >= 0.6 {
            Articulation::Portato
        } else if weight >= 0.4 {
            Articulation::Staccato
        } else {
            Articulation::Staccatissimo
        }
    }
}

/// One resolved tone of a chord.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordTone {
    pub name: String,
    pub midi: u8,
}

/// One note, chord or rest occurrence.
///
/// # Timing fields
/// - `duration`: length in quarter-note beats
/// - `beat_position`: beat offset from the start of the piece
///   (`measure * beats_per_measure + beat_in_measure`)
/// - `absolute_time`: `beat_position / (bpm / 60)`, seconds
///
/// Rests carry `midi: None` and an empty `chord`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedNote {
    /// Pitch text as written (`C#4`, `[Am/E]`, `R`)
    pub pitch: String,
    /// Single pitch, or the lowest tone of a chord
    pub midi: Option<u8>,
    pub duration: f64,
    pub duration_secs: f64,
    pub velocity: f64,
    pub articulation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articulation_kind: Option<Articulation>,
    /// 0-indexed
    pub measure: usize,
    pub beat_position: f64,
    pub beat_in_measure: f64,
    pub absolute_time: f64,
    pub voice: u8,
    pub is_chord: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chord: Vec<ChordTone>,
}

impl ParsedNote {
    pub fn is_rest(&self) -> bool {
        self.midi.is_none()
    }

    /// Every sounding MIDI number, lowest first for chords.
    pub fn midi_notes(&self) -> Vec<u8> {
        if self.is_chord {
            self.chord.iter().map(|t| t.midi).collect()
        } else {
            self.midi.into_iter().collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    UnknownDuration,
    UnknownArticulation,
    UnknownVelocity,
    VelocityOutOfRange,
    UnexpectedSuffix,
}

/// A recoverable, token-level problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// 1-indexed
    pub measure: usize,
    pub token: String,
    pub message: String,
}

/// Result of a successful parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub notes: Vec<ParsedNote>,
    pub diagnostics: Vec<Diagnostic>,
    /// Defaults after front-matter overrides
    pub defaults: GlobalDefaults,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ParseOutcome {
    /// Sounding notes and chords, rests excluded.
    pub fn sounding(&self) -> impl Iterator<Item = &ParsedNote> {
        self.notes.iter().filter(|n| !n.is_rest())
    }
}
