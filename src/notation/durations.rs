//! Duration and time-signature tables
//!
//! Duration codes are stored as fractions of a whole note; beats are always
//! quarter-note beats, so `beats = fraction * 4`.
//!
//! | Code | Name          | Whole fraction | Beats |
//! |------|---------------|----------------|-------|
//! | `w`  | whole         | 1              | 4     |
//! | `h`  | half          | 1/2            | 2     |
//! | `q`  | quarter       | 1/4            | 1     |
//! | `e`  | eighth        | 1/8            | 0.5   |
//! | `s`  | sixteenth     | 1/16           | 0.25  |
//! | `t`  | thirty-second | 1/32           | 0.125 |
//!
//! A trailing `*` dots the value (x1.5), a trailing `3` makes it a triplet
//! (x2/3). Both may be combined: `e*3`.

use serde::Serialize;

use crate::error::NotationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DurationCode {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl DurationCode {
    pub const ALL: [DurationCode; 6] = [
        DurationCode::Whole,
        DurationCode::Half,
        DurationCode::Quarter,
        DurationCode::Eighth,
        DurationCode::Sixteenth,
        DurationCode::ThirtySecond,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'w' => Some(DurationCode::Whole),
            'h' => Some(DurationCode::Half),
            'q' => Some(DurationCode::Quarter),
            'e' => Some(DurationCode::Eighth),
            's' => Some(DurationCode::Sixteenth),
            't' => Some(DurationCode::ThirtySecond),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            DurationCode::Whole => 'w',
            DurationCode::Half => 'h',
            DurationCode::Quarter => 'q',
            DurationCode::Eighth => 'e',
            DurationCode::Sixteenth => 's',
            DurationCode::ThirtySecond => 't',
        }
    }

    pub fn whole_fraction(self) -> f64 {
        match self {
            DurationCode::Whole => 1.0,
            DurationCode::Half => 0.5,
            DurationCode::Quarter => 0.25,
            DurationCode::Eighth => 0.125,
            DurationCode::Sixteenth => 0.0625,
            DurationCode::ThirtySecond => 0.03125,
        }
    }

    pub fn beats(self) -> f64 {
        self.whole_fraction() * 4.0
    }
}

/// A decoded duration token such as `q`, `h*` or `e3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteDuration {
    pub code: DurationCode,
    pub dotted: bool,
    pub triplet: bool,
}

impl NoteDuration {
    pub const QUARTER: NoteDuration = NoteDuration {
        code: DurationCode::Quarter,
        dotted: false,
        triplet: false,
    };

    /// Decode a duration code. Returns `None` for anything outside the table.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let code = DurationCode::from_char(chars.next()?)?;
        let mut dotted = false;
        let mut triplet = false;
        for c in chars {
            match c {
                '*' if !dotted => dotted = true,
                '3' if !triplet => triplet = true,
                _ => return None,
            }
        }
        Some(Self {
            code,
            dotted,
            triplet,
        })
    }

    pub fn beats(&self) -> f64 {
        let mut beats = self.code.beats();
        if self.dotted {
            beats *= 1.5;
        }
        if self.triplet {
            beats *= 2.0 / 3.0;
        }
        beats
    }
}

/// Convert quarter-note beats to seconds at `bpm`.
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    beats * 60.0 / bpm
}

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats: 4,
            beat_type: 4,
        }
    }
}

impl TimeSignature {
    pub fn parse(s: &str) -> Result<Self, NotationError> {
        let invalid = || NotationError::InvalidTimeSignature(s.to_string());
        let (beats, beat_type) = s.trim().split_once('/').ok_or_else(invalid)?;
        let beats: u8 = beats.trim().parse().map_err(|_| invalid())?;
        let beat_type: u8 = beat_type.trim().parse().map_err(|_| invalid())?;

        if !(1..=32).contains(&beats) || !matches!(beat_type, 1 | 2 | 4 | 8 | 16 | 32) {
            return Err(invalid());
        }
        Ok(Self { beats, beat_type })
    }

    /// Measure length in quarter-note beats (6/8 = 3.0, 4/4 = 4.0).
    pub fn beats_per_measure(&self) -> f64 {
        self.beats as f64 * 4.0 / self.beat_type as f64
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.beats, self.beat_type)
    }
}
