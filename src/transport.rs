//! Transport: play/pause/stop state, tempo, and the current score position.
//!
//! Position is measured in score seconds, i.e. seconds at the tempo the
//! score was compiled for (the reference BPM). While playing it advances at
//! `bpm / reference_bpm` times wall-clock speed:
//!
//! ```text
//! current = offset + (timeline.now() - anchor) * bpm / reference_bpm
//! ```
//!
//! Changing tempo folds the elapsed time into `offset` and re-anchors, so
//! the position never jumps; only the rate going forward changes.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::notation::{MAX_BPM, MIN_BPM};
use crate::timeline::Timeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Stopped,
    Paused,
    Playing,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Stopped => "stopped",
            TransportState::Paused => "paused",
            TransportState::Playing => "playing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatus {
    pub state: TransportState,
    pub bpm: f64,
    pub reference_bpm: f64,
    pub current_time: f64,
}

#[derive(Debug)]
struct Position {
    state: TransportState,
    bpm: f64,
    reference_bpm: f64,
    /// Score seconds accumulated before `anchor`
    offset: f64,
    /// Timeline time at the last play or tempo change
    anchor: f64,
}

impl Position {
    fn rate(&self) -> f64 {
        self.bpm / self.reference_bpm
    }

    fn current(&self, now: f64) -> f64 {
        match self.state {
            TransportState::Playing => self.offset + (now - self.anchor).max(0.0) * self.rate(),
            _ => self.offset,
        }
    }
}

pub struct Transport {
    timeline: Arc<dyn Timeline>,
    position: Mutex<Position>,
}

fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_nan() {
        warn!("BPM is NaN, using {}", MIN_BPM);
        return MIN_BPM;
    }
    let clamped = bpm.clamp(MIN_BPM, MAX_BPM);
    if clamped != bpm {
        warn!(requested = bpm, clamped, "BPM outside {}-{}", MIN_BPM, MAX_BPM);
    }
    clamped
}

impl Transport {
    pub fn new(timeline: Arc<dyn Timeline>, bpm: f64) -> Self {
        let bpm = clamp_bpm(bpm);
        Self {
            timeline,
            position: Mutex::new(Position {
                state: TransportState::Stopped,
                bpm,
                reference_bpm: bpm,
                offset: 0.0,
                anchor: 0.0,
            }),
        }
    }

    /// Start from the beginning when stopped, resume when paused.
    ///
    /// Returns the timeline time playback is anchored at. Already playing
    /// transports report the current time.
    pub fn play(&self) -> f64 {
        let now = self.timeline.now();
        let mut pos = self.position.lock();
        if pos.state == TransportState::Playing {
            return now;
        }
        pos.anchor = now;
        pos.state = TransportState::Playing;
        info!(at = pos.offset, bpm = pos.bpm, "Transport playing");
        now
    }

    /// Freeze the position.
    pub fn pause(&self) {
        let now = self.timeline.now();
        let mut pos = self.position.lock();
        if pos.state != TransportState::Playing {
            return;
        }
        pos.offset = pos.current(now);
        pos.state = TransportState::Paused;
        info!(at = pos.offset, "Transport paused");
    }

    /// Halt and rewind to zero.
    pub fn stop(&self) {
        let mut pos = self.position.lock();
        pos.offset = 0.0;
        pos.state = TransportState::Stopped;
        info!("Transport stopped");
    }

    /// Change tempo without moving the current position.
    pub fn set_bpm(&self, bpm: f64) {
        let bpm = clamp_bpm(bpm);
        let now = self.timeline.now();
        let mut pos = self.position.lock();
        if pos.state == TransportState::Playing {
            pos.offset = pos.current(now);
            pos.anchor = now;
        }
        debug!(from = pos.bpm, to = bpm, "Tempo change");
        pos.bpm = bpm;
    }

    /// Set both the playing tempo and the tempo score times are written at.
    /// Used when loading a new score into a stopped transport.
    pub fn load_tempo(&self, bpm: f64) {
        let bpm = clamp_bpm(bpm);
        let now = self.timeline.now();
        let mut pos = self.position.lock();
        if pos.state == TransportState::Playing {
            pos.offset = pos.current(now);
            pos.anchor = now;
        }
        pos.bpm = bpm;
        pos.reference_bpm = bpm;
    }

    /// Score seconds since the start.
    pub fn current_time(&self) -> f64 {
        let now = self.timeline.now();
        self.position.lock().current(now)
    }

    pub fn state(&self) -> TransportState {
        self.position.lock().state
    }

    pub fn bpm(&self) -> f64 {
        self.position.lock().bpm
    }

    /// Score seconds per wall-clock second.
    pub fn rate(&self) -> f64 {
        self.position.lock().rate()
    }

    /// Timeline time and score position read under one lock.
    pub fn snapshot(&self) -> (f64, f64, f64) {
        let now = self.timeline.now();
        let pos = self.position.lock();
        (now, pos.current(now), pos.rate())
    }

    /// Score position and rate as seen at timeline time `wall`.
    pub fn snapshot_at(&self, wall: f64) -> (f64, f64, f64) {
        let pos = self.position.lock();
        (wall, pos.current(wall), pos.rate())
    }

    pub fn status(&self) -> TransportStatus {
        let now = self.timeline.now();
        let pos = self.position.lock();
        TransportStatus {
            state: pos.state,
            bpm: pos.bpm,
            reference_bpm: pos.reference_bpm,
            current_time: pos.current(now),
        }
    }
}
