//! Pitch name decoding
//!
//! `C4` = MIDI 60. Letters are case-insensitive, up to two `#`/`b`
//! accidentals may follow, and the octave (0-10) defaults to 4.

use crate::error::NotationError;

pub const DEFAULT_OCTAVE: i32 = 4;
pub const MAX_OCTAVE: i32 = 10;

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Semitone offset of a natural pitch letter from C.
pub fn letter_class(letter: char) -> Option<i32> {
    match letter.to_ascii_uppercase() {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// Decode a pitch such as `C#4`, `bb3` or `G` into an unclamped MIDI number.
///
/// `token` and `measure` (1-indexed) only feed the error.
pub fn parse_pitch(text: &str, token: &str, measure: usize) -> Result<i32, NotationError> {
    let invalid = |message: String| NotationError::InvalidPitch {
        token: token.to_string(),
        measure,
        message,
    };

    let mut chars = text.chars().peekable();
    let letter = chars
        .next()
        .ok_or_else(|| invalid("empty pitch".to_string()))?;
    let class =
        letter_class(letter).ok_or_else(|| invalid(format!("'{}' is not a pitch letter", letter)))?;

    let mut accidental = 0;
    let mut accidental_count = 0;
    while let Some(&c) = chars.peek() {
        let step = match c {
            '#' => 1,
            'b' => -1,
            _ => break,
        };
        accidental_count += 1;
        if accidental_count > 2 {
            return Err(invalid("more than two accidentals".to_string()));
        }
        accidental += step;
        chars.next();
    }

    let rest: String = chars.collect();
    let octave = if rest.is_empty() {
        DEFAULT_OCTAVE
    } else {
        rest.parse::<i32>()
            .map_err(|_| invalid(format!("unreadable octave '{}'", rest)))?
    };
    if !(0..=MAX_OCTAVE).contains(&octave) {
        return Err(NotationError::OctaveOutOfRange {
            token: token.to_string(),
            measure,
            octave,
        });
    }

    Ok((octave + 1) * 12 + class + accidental)
}

/// Clamp into the MIDI note range.
pub fn clamp_midi(value: i32) -> u8 {
    value.clamp(0, 127) as u8
}

/// Sharp-spelled name of a MIDI number (60 -> "C4").
pub fn midi_to_name(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{}", SHARP_NAMES[(midi % 12) as usize], octave)
}
