//! MIDI sink boundary.
//!
//! Maestro never talks to a port itself. A [`MidiSink`] performs the actual
//! write; [`SinkBridge`] connects one to an [`EventManager`] so fired events
//! reach it.
//!
//! Channels are 1-16 at this boundary and become 0-15 in the status byte.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::SinkError;
use crate::events::{EventManager, ListenerId, NotePhase};
use crate::score::SystemMessage;

pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_RESET_CONTROLLERS: u8 = 121;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// One channel-voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiMessage {
    fn status_channel(channel: u8) -> u8 {
        channel.clamp(1, 16) - 1
    }

    /// Wire encoding: status | channel, then data bytes masked to 7 bits.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOn { channel, note, velocity } => vec![
                0x90 | Self::status_channel(channel),
                note & 0x7F,
                velocity & 0x7F,
            ],
            MidiMessage::NoteOff { channel, note } => {
                vec![0x80 | Self::status_channel(channel), note & 0x7F, 0]
            }
            MidiMessage::ControlChange { channel, controller, value } => vec![
                0xB0 | Self::status_channel(channel),
                controller & 0x7F,
                value & 0x7F,
            ],
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | Self::status_channel(channel), program & 0x7F]
            }
        }
    }
}

pub trait MidiSink: Send + Sync {
    fn send_note_on(&self, note: u8, velocity: u8, channel: u8) -> Result<(), SinkError>;
    fn send_note_off(&self, note: u8, channel: u8) -> Result<(), SinkError>;
    fn send_cc(&self, controller: u8, value: u8, channel: u8) -> Result<(), SinkError>;
    fn send_program_change(&self, program: u8, channel: u8) -> Result<(), SinkError>;

    fn all_notes_off(&self, channel: u8) -> Result<(), SinkError> {
        self.send_cc(CC_ALL_NOTES_OFF, 0, channel)
    }

    /// Silence every channel.
    fn panic(&self) -> Result<(), SinkError> {
        for channel in 1..=16 {
            self.send_cc(CC_ALL_SOUND_OFF, 0, channel)?;
            self.all_notes_off(channel)?;
        }
        Ok(())
    }
}

/// Forwards fired events to a [`MidiSink`].
///
/// Tempo and time-signature events carry no channel message and are only
/// logged. An `AllNotesOff` event without a channel triggers the sink's panic.
pub struct SinkBridge {
    sink: Arc<dyn MidiSink>,
    listeners: Vec<ListenerId>,
}

impl SinkBridge {
    pub fn attach(events: &EventManager, sink: Arc<dyn MidiSink>) -> Self {
        let note_sink = Arc::clone(&sink);
        let note = events.on_note(move |phase, event| match phase {
            NotePhase::On => {
                note_sink.send_note_on(event.midi, event.midi_velocity(), event.channel)
            }
            NotePhase::Off => note_sink.send_note_off(event.midi, event.channel),
        });

        let cc_sink = Arc::clone(&sink);
        let cc = events.on_cc(move |event| {
            cc_sink.send_cc(event.controller, event.value, event.channel)
        });

        let system_sink = Arc::clone(&sink);
        let system = events.on_system(move |event| match (&event.message, event.channel) {
            (SystemMessage::ProgramChange { program }, Some(channel)) => {
                system_sink.send_program_change(*program, channel)
            }
            (SystemMessage::ProgramChange { program }, None) => {
                system_sink.send_program_change(*program, 1)
            }
            (SystemMessage::AllNotesOff, Some(channel)) => system_sink.all_notes_off(channel),
            (SystemMessage::AllNotesOff, None) => system_sink.panic(),
            (other, _) => {
                debug!(message = ?other, "System event has no MIDI output");
                Ok(())
            }
        });

        Self {
            sink,
            listeners: vec![note, cc, system],
        }
    }

    pub fn sink(&self) -> &Arc<dyn MidiSink> {
        &self.sink
    }

    pub fn detach(self, events: &EventManager) {
        for id in self.listeners {
            events.unsubscribe(id);
        }
    }
}

/// Encodes each message and logs the bytes.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl LoggingSink {
    fn write(&self, message: MidiMessage) -> Result<(), SinkError> {
        let bytes = message.to_bytes();
        info!(?message, bytes = ?bytes, "MIDI out");
        Ok(())
    }
}

impl MidiSink for LoggingSink {
    fn send_note_on(&self, note: u8, velocity: u8, channel: u8) -> Result<(), SinkError> {
        self.write(MidiMessage::NoteOn { channel, note, velocity })
    }

    fn send_note_off(&self, note: u8, channel: u8) -> Result<(), SinkError> {
        self.write(MidiMessage::NoteOff { channel, note })
    }

    fn send_cc(&self, controller: u8, value: u8, channel: u8) -> Result<(), SinkError> {
        self.write(MidiMessage::ControlChange { channel, controller, value })
    }

    fn send_program_change(&self, program: u8, channel: u8) -> Result<(), SinkError> {
        self.write(MidiMessage::ProgramChange { channel, program })
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<MidiMessage>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    fn push(&self, message: MidiMessage) -> Result<(), SinkError> {
        self.messages.lock().push(message);
        Ok(())
    }
}

impl MidiSink for RecordingSink {
    fn send_note_on(&self, note: u8, velocity: u8, channel: u8) -> Result<(), SinkError> {
        self.push(MidiMessage::NoteOn { channel, note, velocity })
    }

    fn send_note_off(&self, note: u8, channel: u8) -> Result<(), SinkError> {
        self.push(MidiMessage::NoteOff { channel, note })
    }

    fn send_cc(&self, controller: u8, value: u8, channel: u8) -> Result<(), SinkError> {
        self.push(MidiMessage::ControlChange { channel, controller, value })
    }

    fn send_program_change(&self, program: u8, channel: u8) -> Result<(), SinkError> {
        self.push(MidiMessage::ProgramChange { channel, program })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::Articulation;
    use crate::score::{NoteEvent, SystemEvent};

    #[test]
    fn test_message_bytes() {
        let on = MidiMessage::NoteOn { channel: 1, note: 60, velocity: 100 };
        assert_eq!(on.to_bytes(), vec![0x90, 60, 100]);

        let cc = MidiMessage::ControlChange { channel: 16, controller: 91, value: 200 };
        assert_eq!(cc.to_bytes(), vec![0xBF, 91, 200 & 0x7F]);

        let pc = MidiMessage::ProgramChange { channel: 10, program: 33 };
        assert_eq!(pc.to_bytes(), vec![0xC9, 33]);
    }

    #[test]
    fn test_panic_covers_all_channels() {
        let sink = RecordingSink::new();
        sink.panic().unwrap();
        let messages = sink.messages();
        assert_eq!(messages.len(), 32);
        assert_eq!(
            messages[1],
            MidiMessage::ControlChange { channel: 1, controller: CC_ALL_NOTES_OFF, value: 0 }
        );
    }

    #[test]
    fn test_bridge_forwards_events() {
        let events = EventManager::new();
        let sink = Arc::new(RecordingSink::new());
        let bridge = SinkBridge::attach(&events, sink.clone());

        let note = NoteEvent {
            absolute_time: 0.0,
            tone: "E4".to_string(),
            midi: 64,
            velocity: 1.0,
            duration: 0.5,
            channel: 2,
            articulation: Articulation::Legato,
            note_off_time: 0.5,
        };
        events.emit_note(NotePhase::On, &note).unwrap();
        events.emit_note(NotePhase::Off, &note).unwrap();
        events
            .emit_system(&SystemEvent {
                absolute_time: 0.0,
                message: SystemMessage::TempoChange { bpm: 90.0 },
                channel: None,
            })
            .unwrap();
        events
            .emit_system(&SystemEvent {
                absolute_time: 0.0,
                message: SystemMessage::ProgramChange { program: 5 },
                channel: Some(2),
            })
            .unwrap();

        assert_eq!(
            sink.messages(),
            vec![
                MidiMessage::NoteOn { channel: 2, note: 64, velocity: 127 },
                MidiMessage::NoteOff { channel: 2, note: 64 },
                MidiMessage::ProgramChange { channel: 2, program: 5 },
            ]
        );

        bridge.detach(&events);
        events.emit_note(NotePhase::On, &note).unwrap();
        assert_eq!(sink.messages().len(), 3);
    }
}
