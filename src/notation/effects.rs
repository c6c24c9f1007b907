//! Swing and effects post-processing over parsed notes.
//!
//! - [`apply_swing`] shifts off-beat short notes later, in place.
//! - [`apply_effects`] returns a transformed copy: transpose (clamped to the
//!   MIDI range), reverb-driven articulation lengthening, and velocity
//!   normalization.

use serde::Deserialize;

use super::pitch::{clamp_midi, midi_to_name};
use super::types::ParsedNote;

/// Notes this short or shorter (in beats) are swung.
pub const SWING_MAX_BEATS: f64 = 0.5;

/// Articulation added per unit of reverb.
pub const REVERB_SUSTAIN: f64 = 0.3;

const EPSILON: f64 = 1e-9;

/// Delay off-beat eighths (and shorter) by `duration * swing * 0.5`.
///
/// A note is off-beat when it starts in the second half of its beat.
/// Only `absolute_time` moves; beat positions keep the written grid.
pub fn apply_swing(notes: &mut [ParsedNote], swing: f64) {
    if swing <= 0.0 {
        return;
    }
    for note in notes.iter_mut() {
        if note.duration > SWING_MAX_BEATS + EPSILON {
            continue;
        }
        let within_beat = note.beat_position.fract();
        if within_beat + EPSILON >= 0.5 {
            note.absolute_time += note.duration_secs * swing * 0.5;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EffectOptions {
    pub transpose: Option<i32>,
    pub reverb: Option<f64>,
}

/// Map a velocity onto 0..1. Values above 1 are read as MIDI 0-127.
pub fn normalize_velocity(velocity: f64) -> f64 {
    let velocity = if velocity > 1.0 {
        velocity / 127.0
    } else {
        velocity
    };
    velocity.clamp(0.0, 1.0)
}

/// Return a transformed copy of `notes`; the input is never touched.
pub fn apply_effects(notes: &[ParsedNote], options: &EffectOptions) -> Vec<ParsedNote> {
    let transpose = options.transpose.unwrap_or(0);
    let reverb = options.reverb.unwrap_or(0.0).max(0.0);

    notes
        .iter()
        .map(|note| {
            let mut note = note.clone();
            if transpose != 0 {
                note.midi = note.midi.map(|m| clamp_midi(m as i32 + transpose));
                for tone in &mut note.chord {
                    tone.midi = clamp_midi(tone.midi as i32 + transpose);
                    tone.name = midi_to_name(tone.midi);
                }
            }
            if reverb > 0.0 {
                note.articulation = (note.articulation + reverb * REVERB_SUSTAIN).min(1.0);
            }
            note.velocity = normalize_velocity(note.velocity);
            note
        })
        .collect()
}
