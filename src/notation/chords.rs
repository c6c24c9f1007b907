//! Chord symbol expansion
//!
//! Expands a chord symbol (`C`, `Am`, `G7`, `Dm7/F`, ...) into absolute,
//! unclamped MIDI pitches rooted at a target octave.
//!
//! # Supported Chord Types
//! - **Major**: `""`, `maj`, `M` -> root, major 3rd, perfect 5th
//! - **Minor**: `m`, `min`, `-` -> root, minor 3rd, perfect 5th
//! - **Sevenths**: `7`, `maj7`/`M7`, `m7`/`min7`/`-7`, `dim7`, `m7b5`/`ø`
//! - **Altered triads**: `dim`/`°`, `aug`/`+`, `sus2`, `sus4`, `7sus4`
//! - **Sixths**: `6`, `m6`
//! - **Extended**: `add9`, `9`, `maj9`/`M9`, `m9`/`min9`, `11`, `13`
//!
//! A `/X` suffix is an inversion: the bass pitch class `X` becomes the lowest
//! tone, one octave under its chord position. A bass that is not a chord tone
//! is added under the chord.

use super::pitch::letter_class;
use super::types::Voicing;

/// Intervals above the root for a chord quality.
pub fn chord_intervals(quality: &str) -> Option<&'static [i32]> {
    let intervals: &'static [i32] = match quality {
        "" | "maj" | "M" => &[0, 4, 7],
        "m" | "min" | "-" => &[0, 3, 7],
        "7" => &[0, 4, 7, 10],
        "maj7" | "M7" => &[0, 4, 7, 11],
        "m7" | "min7" | "-7" => &[0, 3, 7, 10],
        "dim" | "°" => &[0, 3, 6],
        "dim7" | "°7" => &[0, 3, 6, 9],
        "m7b5" | "ø" => &[0, 3, 6, 10],
        "aug" | "+" => &[0, 4, 8],
        "sus2" => &[0, 2, 7],
        "sus4" | "sus" => &[0, 5, 7],
        "7sus4" => &[0, 5, 7, 10],
        "6" => &[0, 4, 7, 9],
        "m6" => &[0, 3, 7, 9],
        "add9" => &[0, 4, 7, 14],
        "9" => &[0, 4, 7, 10, 14],
        "maj9" | "M9" => &[0, 4, 7, 11, 14],
        "m9" | "min9" => &[0, 3, 7, 10, 14],
        "11" => &[0, 4, 7, 10, 14, 17],
        "13" => &[0, 4, 7, 10, 14, 21],
        _ => return None,
    };
    Some(intervals)
}

/// Parse `[A-G][#|b]?`, returning the pitch class and the remaining text.
fn split_root(s: &str) -> Option<(i32, &str)> {
    let mut chars = s.chars();
    let letter = chars.next()?;
    if !letter.is_ascii_uppercase() {
        return None;
    }
    let mut class = letter_class(letter)?;
    let rest = chars.as_str();
    let rest = if let Some(r) = rest.strip_prefix('#') {
        class += 1;
        r
    } else if let Some(r) = rest.strip_prefix('b') {
        class -= 1;
        r
    } else {
        rest
    };
    Some((class.rem_euclid(12), rest))
}

/// A decoded chord symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordSymbol {
    pub root: i32,
    pub quality: String,
    pub bass: Option<i32>,
}

impl ChordSymbol {
    pub fn parse(symbol: &str) -> Result<Self, String> {
        let (body, bass) = match symbol.split_once('/') {
            Some((body, bass)) => {
                let (bass_class, extra) =
                    split_root(bass).ok_or_else(|| format!("invalid bass note '{}'", bass))?;
                if !extra.is_empty() {
                    return Err(format!("invalid bass note '{}'", bass));
                }
                (body, Some(bass_class))
            }
            None => (symbol, None),
        };

        let (root, quality) =
            split_root(body).ok_or_else(|| format!("invalid chord root in '{}'", symbol))?;
        if chord_intervals(quality).is_none() {
            return Err(format!("unknown chord quality '{}'", quality));
        }
        Ok(Self {
            root,
            quality: quality.to_string(),
            bass,
        })
    }

    /// Unclamped pitches, lowest first.
    pub fn pitches(&self, octave: i32, voicing: Voicing) -> Vec<i32> {
        let root = (octave + 1) * 12 + self.root;
        let intervals = chord_intervals(&self.quality).unwrap_or(&[0, 4, 7]);
        let mut pitches: Vec<i32> = intervals.iter().map(|i| root + i).collect();

        apply_voicing(&mut pitches, voicing);

        if let Some(bass) = self.bass {
            invert(&mut pitches, bass);
        }
        pitches
    }
}

fn apply_voicing(pitches: &mut Vec<i32>, voicing: Voicing) {
    if pitches.len() < 3 {
        return;
    }
    match voicing {
        Voicing::Close => {}
        Voicing::Open => {
            pitches[1] += 12;
        }
        Voicing::Drop2 => {
            let idx = pitches.len() - 2;
            pitches[idx] -= 12;
        }
    }
    pitches.sort_unstable();
}

/// Put pitch class `bass` at the bottom, one octave under where it sat.
fn invert(pitches: &mut Vec<i32>, bass: i32) {
    let Some(lowest) = pitches.first().copied() else {
        return;
    };
    if let Some(idx) = pitches.iter().position(|p| p.rem_euclid(12) == bass) {
        let tone = pitches.remove(idx);
        let mut lowered = tone - 12;
        while lowered >= lowest {
            lowered -= 12;
        }
        pitches.insert(0, lowered);
    } else {
        // Slash chord with a foreign bass: nearest such pitch under the chord
        let mut below = lowest - 1;
        while below.rem_euclid(12) != bass {
            below -= 1;
        }
        pitches.insert(0, below);
    }
}

/// Expand a chord symbol at `octave`.
///
/// # Examples
/// ```
/// use maestro::notation::expand_chord;
/// use maestro::Voicing;
///
/// // C major at octave 4: C4, E4, G4
/// assert_eq!(expand_chord("C", 4, Voicing::Close).unwrap(), vec![60, 64, 67]);
///
/// // G7 at octave 3: G3, B3, D4, F4
/// assert_eq!(expand_chord("G7", 3, Voicing::Close).unwrap(), vec![55, 59, 62, 65]);
///
/// // C/E first inversion: E3 under C4 and G4
/// assert_eq!(expand_chord("C/E", 4, Voicing::Close).unwrap(), vec![52, 60, 67]);
/// ```
pub fn expand_chord(symbol: &str, octave: i32, voicing: Voicing) -> Result<Vec<i32>, String> {
    Ok(ChordSymbol::parse(symbol)?.pitches(octave, voicing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_parsing() {
        // Matches the classic C3-rooted accompaniment voicings
        assert_eq!(expand_chord("C", 3, Voicing::Close).unwrap(), vec![48, 52, 55]);
        assert_eq!(expand_chord("Dm", 3, Voicing::Close).unwrap(), vec![50, 53, 57]);
        assert_eq!(expand_chord("G7", 3, Voicing::Close).unwrap(), vec![55, 59, 62, 65]);
        assert_eq!(expand_chord("Cmaj7", 3, Voicing::Close).unwrap(), vec![48, 52, 55, 59]);
        assert_eq!(expand_chord("F#", 3, Voicing::Close).unwrap(), vec![54, 58, 61]);
        assert_eq!(expand_chord("Bbm", 3, Voicing::Close).unwrap(), vec![58, 61, 65]);
    }

    #[test]
    fn test_inversions() {
        // Am/E: E moves under A
        assert_eq!(expand_chord("Am/E", 4, Voicing::Close).unwrap(), vec![64, 69, 72]);
        // C/G: second inversion
        assert_eq!(expand_chord("C/G", 4, Voicing::Close).unwrap(), vec![55, 60, 64]);
        // C/Bb: foreign bass slots in under the chord
        assert_eq!(expand_chord("C/Bb", 4, Voicing::Close).unwrap(), vec![58, 60, 64, 67]);
    }

    #[test]
    fn test_voicings() {
        assert_eq!(expand_chord("C", 4, Voicing::Open).unwrap(), vec![60, 67, 76]);
        assert_eq!(expand_chord("Cmaj7", 4, Voicing::Drop2).unwrap(), vec![55, 60, 64, 71]);
    }

    #[test]
    fn test_invalid_symbols() {
        assert!(expand_chord("Cfoo", 4, Voicing::Close).is_err());
        assert!(expand_chord("H7", 4, Voicing::Close).is_err());
        assert!(expand_chord("C/Q", 4, Voicing::Close).is_err());
        assert!(expand_chord("", 4, Voicing::Close).is_err());
    }
}
