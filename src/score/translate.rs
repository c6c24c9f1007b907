//! Parsed notes to executable score
//!
//! - Rests emit nothing; chords emit one [`NoteEvent`] per tone.
//! - Sounding length is the written length scaled by the articulation weight.
//! - Voice `n` plays on channel `defaults.channel + n - 1`, wrapping inside 1-16.
//! - Tempo, time signature and (optional) program change are emitted at
//!   time 0, plus a reverb send (CC 91) per channel when reverb is set.

use std::collections::BTreeSet;

use super::types::{CCEvent, ExecutableScore, NoteEvent, ScoreMetadata, SystemEvent, SystemMessage};
use crate::notation::{normalize_velocity, Articulation, GlobalDefaults, ParseOutcome, ParsedNote};

pub const REVERB_CONTROLLER: u8 = 91;

/// MIDI channel (1-16) for a voice.
pub fn voice_channel(base: u8, voice: u8) -> u8 {
    let base = base.clamp(1, 16) as u16 - 1;
    let voice = voice.max(1) as u16 - 1;
    ((base + voice) % 16) as u8 + 1
}

fn note_events(note: &ParsedNote, channel: u8) -> Vec<NoteEvent> {
    let duration = note.duration_secs * note.articulation.clamp(0.0, 1.0);
    let articulation = note
        .articulation_kind
        .unwrap_or_else(|| Articulation::from_weight(note.articulation));
    let velocity = normalize_velocity(note.velocity);

    let tones: Vec<(String, u8)> = if note.is_chord {
        note.chord.iter().map(|t| (t.name.clone(), t.midi)).collect()
    } else {
        note.midi.map(|m| (note.pitch.clone(), m)).into_iter().collect()
    };

    tones
        .into_iter()
        .map(|(tone, midi)| NoteEvent {
            absolute_time: note.absolute_time,
            tone,
            midi: midi.min(127),
            velocity,
            duration,
            channel,
            articulation,
            note_off_time: note.absolute_time + duration,
        })
        .collect()
}

/// Translate a list of parsed notes using `defaults` for tempo and channels.
pub fn translate_notes(
    notes: &[ParsedNote],
    defaults: &GlobalDefaults,
    title: Option<String>,
) -> ExecutableScore {
    let mut events: Vec<NoteEvent> = Vec::new();
    let mut channels = BTreeSet::new();
    let mut total_duration: f64 = 0.0;

    for note in notes {
        total_duration = total_duration.max(note.absolute_time + note.duration_secs);
        let channel = voice_channel(defaults.channel, note.voice);
        let produced = note_events(note, channel);
        if !produced.is_empty() {
            channels.insert(channel);
        }
        events.extend(produced);
    }
    events.sort_by(|a, b| a.absolute_time.total_cmp(&b.absolute_time));

    let mut system_events = vec![
        SystemEvent {
            absolute_time: 0.0,
            message: SystemMessage::TempoChange { bpm: defaults.bpm },
            channel: None,
        },
        SystemEvent {
            absolute_time: 0.0,
            message: SystemMessage::TimeSignatureChange {
                signature: defaults.time_signature.clone(),
            },
            channel: None,
        },
    ];
    if let Some(program) = defaults.program {
        system_events.extend(channels.iter().map(|&channel| SystemEvent {
            absolute_time: 0.0,
            message: SystemMessage::ProgramChange {
                program: program.min(127),
            },
            channel: Some(channel),
        }));
    }

    let mut cc_events = Vec::new();
    if defaults.reverb > 0.0 {
        let value = (defaults.reverb.clamp(0.0, 1.0) * 127.0).round() as u8;
        cc_events.extend(channels.iter().map(|&channel| CCEvent {
            absolute_time: 0.0,
            controller: REVERB_CONTROLLER,
            value,
            channel,
        }));
    }

    let event_count = events.len() + cc_events.len() + system_events.len();
    ExecutableScore {
        metadata: ScoreMetadata {
            title,
            bpm: defaults.bpm,
            time_signature: defaults.time_signature.clone(),
            key: defaults.key.clone(),
            total_duration,
            event_count,
        },
        notes: events,
        cc_events,
        system_events,
    }
}

/// Translate a parse outcome with the defaults it was parsed under.
pub fn translate(outcome: &ParseOutcome) -> ExecutableScore {
    translate_notes(&outcome.notes, &outcome.defaults, outcome.title.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::parse;
    use approx::assert_relative_eq;

    #[test]
    fn test_translate_basic() {
        let outcome = parse("C4:q D4:e R:q E4:h", &GlobalDefaults::default()).unwrap();
        let score = translate(&outcome);

        assert_eq!(score.notes.len(), 3);
        assert_eq!(score.notes[0].midi, 60);
        assert_eq!(score.notes[0].channel, 1);
        // 0.5s quarter x 0.8 default articulation
        assert_relative_eq!(score.notes[0].duration, 0.4);
        assert_relative_eq!(score.notes[0].note_off_time, 0.4);
        assert_eq!(score.notes[0].articulation, Articulation::Normal);

        // E4 after C4 (1) + D4 (0.5) + rest (1) = 2.5 beats
        assert_relative_eq!(score.notes[2].absolute_time, 1.25);
        assert_relative_eq!(score.metadata.total_duration, 2.25);
        assert_eq!(score.system_events.len(), 2);
        assert!(score.cc_events.is_empty());
        assert_eq!(score.metadata.event_count, 5);
    }

    #[test]
    fn test_chords_expand_per_tone() {
        let outcome = parse("[C]:h", &GlobalDefaults::default()).unwrap();
        let score = translate(&outcome);
        let midi: Vec<u8> = score.notes.iter().map(|n| n.midi).collect();
        assert_eq!(midi, vec![60, 64, 67]);
        assert!(score.notes.iter().all(|n| n.absolute_time == 0.0));
        assert_eq!(score.dispatch_count(), 8);
    }

    #[test]
    fn test_voices_map_to_channels() {
        let defaults = GlobalDefaults {
            program: Some(33),
            reverb: 0.5,
            ..GlobalDefaults::default()
        };
        let outcome = parse("V1: C4\nV3: C3", &defaults).unwrap();
        let score = translate(&outcome);

        let channels: Vec<u8> = score.notes.iter().map(|n| n.channel).collect();
        assert_eq!(channels, vec![1, 3]);
        // tempo + time signature + one program change per channel
        assert_eq!(score.system_events.len(), 4);
        assert_eq!(score.cc_events.len(), 2);
        assert_eq!(score.cc_events[0].controller, REVERB_CONTROLLER);
        assert_eq!(score.cc_events[0].value, 64);
    }

    #[test]
    fn test_voice_channel_wraps() {
        assert_eq!(voice_channel(1, 1), 1);
        assert_eq!(voice_channel(10, 1), 10);
        assert_eq!(voice_channel(16, 2), 1);
    }

    #[test]
    fn test_velocity_normalized_on_translate() {
        let outcome = parse("C4@127 D4@0.5", &GlobalDefaults::default()).unwrap();
        let score = translate(&outcome);
        assert_eq!(score.notes[0].velocity, 1.0);
        assert_eq!(score.notes[0].midi_velocity(), 127);
        assert_eq!(score.notes[1].midi_velocity(), 64);
    }
}
