//! Token decoding and timing
//!
//! Each token follows `PITCH[:DURATION][@VELOCITY][.ARTICULATION]`.
//!
//! ## Two-tier error model
//! - Pitch problems (bad letter, octave outside 0-10, unresolvable chord)
//!   abort the parse with a [`NotationError`].
//! - Duration, velocity and articulation problems become [`Diagnostic`]s.
//!   A token with an unknown duration is dropped; unknown velocity or
//!   articulation fall back to the defaults.
//!
//! ## Timing
//! Beat positions accumulate left to right inside a measure. A token's
//! absolute time is
//! `(measure * beats_per_measure + beat_in_measure) / (bpm / 60)`, so an
//! under- or over-filled measure never shifts the next one.

use tracing::{debug, warn};

use super::chords::ChordSymbol;
use super::durations::{beats_to_seconds, NoteDuration};
use super::metadata::apply_front_matter;
use super::pitch::{clamp_midi, midi_to_name, parse_pitch};
use super::tokenizer::{split_front_matter, split_measures, split_tokens, split_voices};
use super::types::{
    Articulation, ChordTone, Diagnostic, DiagnosticKind, GlobalDefaults, ParseOutcome, ParsedNote,
};
use crate::error::NotationError;

/// How an articulation code changes a note.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ArticulationRule {
    /// Direct gate weight
    Weight(f64, Articulation),
    /// Velocity boost plus a fixed weight
    Emphasis {
        boost: f64,
        weight: f64,
        kind: Articulation,
    },
}

fn articulation_rule(code: &str) -> Option<ArticulationRule> {
    use ArticulationRule::*;
    let rule = match code {
        "legato" | "l" => Weight(1.0, Articulation::Legato),
        "tenuto" | "ten" => Weight(0.95, Articulation::Tenuto),
        "portato" | "p" => Weight(0.75, Articulation::Portato),
        "staccato" | "stac" | "s" => Weight(0.5, Articulation::Staccato),
        "staccatissimo" | "ss" => Weight(0.25, Articulation::Staccatissimo),
        "accent" | "a" | ">" => Emphasis {
            boost: 0.2,
            weight: 0.9,
            kind: Articulation::Accent,
        },
        "marcato" | "m" | "^" => Emphasis {
            boost: 0.3,
            weight: 0.75,
            kind: Articulation::Marcato,
        },
        _ => return None,
    };
    Some(rule)
}

fn dynamic_velocity(mark: &str) -> Option<f64> {
    let velocity = match mark {
        "ppp" => 0.15,
        "pp" => 0.25,
        "p" => 0.4,
        "mp" => 0.55,
        "mf" => 0.7,
        "f" => 0.8,
        "ff" => 0.9,
        "fff" => 1.0,
        _ => return None,
    };
    Some(velocity)
}

/// Raw modifier slices of one token.
#[derive(Debug, Default)]
struct Modifiers<'a> {
    duration: Option<&'a str>,
    velocity: Option<&'a str>,
    articulation: Option<&'a str>,
}

/// Resolved pitch content of one token.
struct Sound {
    midi: Option<u8>,
    chord: Vec<ChordTone>,
    is_chord: bool,
}

struct TokenParser<'a> {
    defaults: &'a GlobalDefaults,
    diagnostics: &'a mut Vec<Diagnostic>,
    token: &'a str,
    measure: usize,
}

impl<'a> TokenParser<'a> {
    fn diagnose(&mut self, kind: DiagnosticKind, message: String) {
        warn!(
            token = self.token,
            measure = self.measure,
            ?kind,
            "{}",
            message
        );
        self.diagnostics.push(Diagnostic {
            kind,
            measure: self.measure,
            token: self.token.to_string(),
            message,
        });
    }

    /// Split the pitch part from the modifier tail.
    fn split_pitch(&self) -> Result<(&'a str, &'a str), NotationError> {
        let token = self.token;
        if token.starts_with('[') {
            let close = token.find(']').ok_or_else(|| NotationError::InvalidChord {
                token: token.to_string(),
                measure: self.measure,
                message: "'[' is never closed".to_string(),
            })?;
            Ok((&token[..=close], &token[close + 1..]))
        } else {
            let end = token
                .find(|c| c == ':' || c == '@' || c == '.')
                .unwrap_or(token.len());
            Ok((&token[..end], &token[end..]))
        }
    }

    fn split_modifiers(&mut self, mut rest: &'a str) -> Modifiers<'a> {
        let mut mods = Modifiers::default();
        while let Some(c) = rest.chars().next() {
            match c {
                ':' => {
                    let body = &rest[1..];
                    let end = body
                        .find(|c| c == '@' || c == '.')
                        .unwrap_or(body.len());
                    mods.duration = Some(&body[..end]);
                    rest = &body[end..];
                }
                '@' => {
                    let body = &rest[1..];
                    let end = velocity_end(body);
                    mods.velocity = Some(&body[..end]);
                    rest = &body[end..];
                }
                '.' => {
                    mods.articulation = Some(&rest[1..]);
                    rest = "";
                }
                _ => {
                    self.diagnose(
                        DiagnosticKind::UnexpectedSuffix,
                        format!("ignoring unexpected '{}'", rest),
                    );
                    break;
                }
            }
        }
        mods
    }

    fn resolve_sound(&self, pitch: &str) -> Result<Sound, NotationError> {
        let transpose = self.defaults.transpose;

        if pitch == "R" || pitch == "r" {
            return Ok(Sound {
                midi: None,
                chord: Vec::new(),
                is_chord: false,
            });
        }

        if let Some(inner) = pitch.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
            let inner = inner.trim();
            let mut tones = if inner.is_empty() {
                return Err(self.invalid_chord("empty chord".to_string()));
            } else if inner.contains(char::is_whitespace) {
                inner
                    .split_whitespace()
                    .map(|part| {
                        let midi = parse_pitch(part, self.token, self.measure)?;
                        Ok(ChordTone {
                            name: part.to_string(),
                            midi: clamp_midi(midi + transpose),
                        })
                    })
                    .collect::<Result<Vec<_>, NotationError>>()?
            } else {
                self.named_chord(inner)?
            };
            tones.sort_by_key(|t| t.midi);
            return Ok(Sound {
                midi: tones.first().map(|t| t.midi),
                chord: tones,
                is_chord: true,
            });
        }

        let midi = parse_pitch(pitch, self.token, self.measure)?;
        Ok(Sound {
            midi: Some(clamp_midi(midi + transpose)),
            chord: Vec::new(),
            is_chord: false,
        })
    }

    fn named_chord(&self, symbol: &str) -> Result<Vec<ChordTone>, NotationError> {
        let transpose = self.defaults.transpose;
        let pitches = match ChordSymbol::parse(symbol) {
            Ok(chord) => chord.pitches(self.defaults.chord_octave, self.defaults.voicing),
            // `[C4]` is a one-tone chord, not an unknown quality "4"
            Err(message) => match parse_pitch(symbol, self.token, self.measure) {
                Ok(midi) => vec![midi],
                Err(_) => return Err(self.invalid_chord(message)),
            },
        };
        Ok(pitches
            .into_iter()
            .map(|p| {
                let midi = clamp_midi(p + transpose);
                ChordTone {
                    name: midi_to_name(midi),
                    midi,
                }
            })
            .collect())
    }

    fn invalid_chord(&self, message: String) -> NotationError {
        NotationError::InvalidChord {
            token: self.token.to_string(),
            measure: self.measure,
            message,
        }
    }

    fn resolve_velocity(&mut self, raw: Option<&str>) -> f64 {
        let Some(raw) = raw else {
            return self.defaults.velocity;
        };
        if let Ok(value) = raw.parse::<f64>() {
            if !(0.0..=1.0).contains(&value) {
                self.diagnose(
                    DiagnosticKind::VelocityOutOfRange,
                    format!("velocity {} outside 0..1, passed through", value),
                );
            }
            return value;
        }
        if let Some(value) = dynamic_velocity(raw) {
            return value;
        }
        self.diagnose(
            DiagnosticKind::UnknownVelocity,
            format!("unknown velocity '{}', using default", raw),
        );
        self.defaults.velocity
    }

    /// Returns `(articulation weight, kind, velocity)`.
    fn resolve_articulation(
        &mut self,
        raw: Option<&str>,
        velocity: f64,
    ) -> (f64, Option<Articulation>, f64) {
        let Some(raw) = raw else {
            return (self.defaults.articulation, None, velocity);
        };
        if let Ok(weight) = raw.parse::<f64>() {
            if (0.0..=1.0).contains(&weight) {
                return (weight, None, velocity);
            }
        } else if let Some(rule) = articulation_rule(raw) {
            return match rule {
                ArticulationRule::Weight(weight, kind) => (weight, Some(kind), velocity),
                ArticulationRule::Emphasis {
                    boost,
                    weight,
                    kind,
                } => (weight, Some(kind), boost_velocity(velocity, boost)),
            };
        }
        self.diagnose(
            DiagnosticKind::UnknownArticulation,
            format!("unknown articulation '{}', using default", raw),
        );
        (self.defaults.articulation, None, velocity)
    }
}

/// Length of the velocity slice at the start of `body`.
fn velocity_end(body: &str) -> usize {
    let bytes = body.as_bytes();
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    match bytes.first() {
        Some(b) if b.is_ascii_digit() => {
            let mut end = digits(0);
            if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit)
            {
                end += 1 + digits(end + 1);
            }
            end
        }
        Some(b) if b.is_ascii_alphabetic() => bytes
            .iter()
            .take_while(|b| b.is_ascii_alphabetic())
            .count(),
        _ => 0,
    }
}

/// Raise a velocity on whichever scale it was written in.
fn boost_velocity(velocity: f64, boost: f64) -> f64 {
    if velocity > 1.0 {
        (velocity + boost * 127.0).min(127.0)
    } else {
        (velocity + boost).min(1.0)
    }
}

/// Parse hybrid notation into timed notes.
///
/// Front matter overrides apply to this call only. Swing and reverb are not
/// applied here; see [`crate::parse_hybrid_notation`] for the full pipeline.
///
/// # Example
/// ```rust
/// use maestro::notation::parse;
/// use maestro::GlobalDefaults;
///
/// let outcome = parse("C4:q D4:e E4:h", &GlobalDefaults::default()).unwrap();
/// let times: Vec<f64> = outcome.notes.iter().map(|n| n.absolute_time).collect();
/// assert_eq!(times, vec![0.0, 0.5, 0.75]);
/// ```
pub fn parse(notation: &str, defaults: &GlobalDefaults) -> Result<ParseOutcome, NotationError> {
    let (front_matter, body) = split_front_matter(notation)?;
    let (title, defaults) = match front_matter {
        Some(yaml) => {
            let fm = apply_front_matter(yaml, defaults)?;
            (fm.title, fm.defaults)
        }
        None => (None, defaults.clone()),
    };

    let time_signature = defaults.validate()?;
    let beats_per_measure = time_signature.beats_per_measure();
    let beats_per_second = defaults.bpm / 60.0;

    let mut notes = Vec::new();
    let mut diagnostics = Vec::new();

    for voice in split_voices(body)? {
        for (measure_idx, measure_text) in split_measures(&voice.text).into_iter().enumerate() {
            let measure_number = measure_idx + 1;
            let mut beat_in_measure = 0.0;

            for token in split_tokens(measure_text, measure_number)? {
                let mut parser = TokenParser {
                    defaults: &defaults,
                    diagnostics: &mut diagnostics,
                    token,
                    measure: measure_number,
                };

                let (pitch, tail) = parser.split_pitch()?;
                let sound = parser.resolve_sound(pitch)?;
                let mods = parser.split_modifiers(tail);

                let duration = match mods.duration {
                    None => NoteDuration::QUARTER.beats(),
                    Some(code) => match NoteDuration::parse(code) {
                        Some(d) => d.beats(),
                        None => {
                            parser.diagnose(
                                DiagnosticKind::UnknownDuration,
                                format!("unknown duration code '{}', token skipped", code),
                            );
                            continue;
                        }
                    },
                };

                let velocity = parser.resolve_velocity(mods.velocity);
                let (articulation, articulation_kind, velocity) =
                    parser.resolve_articulation(mods.articulation, velocity);

                let beat_position = measure_idx as f64 * beats_per_measure + beat_in_measure;
                notes.push(ParsedNote {
                    pitch: pitch.to_string(),
                    midi: sound.midi,
                    duration,
                    duration_secs: beats_to_seconds(duration, defaults.bpm),
                    velocity,
                    articulation,
                    articulation_kind,
                    measure: measure_idx,
                    beat_position,
                    beat_in_measure,
                    absolute_time: beat_position / beats_per_second,
                    voice: voice.voice,
                    is_chord: sound.is_chord,
                    chord: sound.chord,
                });
                beat_in_measure += duration;
            }
        }
    }

    // Stable: equal times keep voice order, then token order
    notes.sort_by(|a, b| {
        a.absolute_time
            .total_cmp(&b.absolute_time)
            .then(a.voice.cmp(&b.voice))
    });

    debug!(
        notes = notes.len(),
        diagnostics = diagnostics.len(),
        bpm = defaults.bpm,
        "parsed notation"
    );

    Ok(ParseOutcome {
        notes,
        diagnostics,
        defaults,
        title,
    })
}
