//! # Scheduler Module
//!
//! Dispatch the events of an [`ExecutableScore`] at their wall-clock times.
//!
//! ## Flow
//! 1. Every event becomes one or two dispatch points (notes get a separate
//!    note-on and note-off).
//! 2. Each point's delay is `absolute_time - transport.current_time()`,
//!    clamped to zero when already late, then scaled by the transport rate
//!    and registered on the [`Timeline`]. A score that started the transport
//!    is measured from the play instant instead of the current time.
//! 3. When a timer fires, latency and session bookkeeping are updated first,
//!    then the event goes through one of the `trigger_*` functions to the
//!    [`EventManager`]. Those functions are the only path to listeners.
//!
//! A playback id groups the timers of one score. Cancelling it removes every
//! pending timer, sends note-off for notes left sounding, and turns any
//! callback already in flight into a no-op.
//!
//! ## Sub-modules
//! - `latency` - ring buffer and rolling latency statistics
//! - `session` - playback ids and per-session shared state

mod latency;
mod session;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::LatencyConfig;
use crate::events::{EventManager, NotePhase};
use crate::score::{CCEvent, ExecutableScore, NoteEvent, SystemEvent};
use crate::timeline::{Timeline, TimelineKind};
use crate::transport::Transport;

pub use latency::{LatencyStats, LatencyTracker, RingBuffer};
pub use session::PlaybackId;

use session::{Dispatch, Session, SessionShared};

/// Spacing of late events beyond the burst limit.
pub const BURST_SPACING_SECS: f64 = 0.001;

/// A single event for [`Scheduler::schedule_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreEvent {
    Note(NoteEvent),
    Cc(CCEvent),
    System(SystemEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub timeline: TimelineKind,
    pub active_sessions: usize,
    pub pending_dispatches: usize,
    pub latency: LatencyStats,
}

struct Inner {
    timeline: Arc<dyn Timeline>,
    transport: Arc<Transport>,
    events: Arc<EventManager>,
    sessions: Mutex<HashMap<PlaybackId, Session>>,
    latency: Mutex<LatencyTracker>,
    max_burst: Option<usize>,
    finished: Notify,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        timeline: Arc<dyn Timeline>,
        transport: Arc<Transport>,
        events: Arc<EventManager>,
        config: &LatencyConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                timeline,
                transport,
                events,
                sessions: Mutex::new(HashMap::new()),
                latency: Mutex::new(LatencyTracker::new(config.history, config.target_ms)),
                max_burst: config.max_burst,
                finished: Notify::new(),
            }),
        }
    }

    /// Register every event of `score`. Returns immediately.
    pub fn schedule_partitura(&self, score: &ExecutableScore) -> PlaybackId {
        let points = score_points(score, f64::NEG_INFINITY);
        self.inner.schedule_points(PlaybackId::generate(), points, None)
    }

    /// Register every event of `score` with delays measured from timeline
    /// time `start`, normally the instant the transport started. Events due
    /// at `start` are then on time rather than late by however long
    /// registration took.
    pub fn schedule_partitura_at(&self, score: &ExecutableScore, start: f64) -> PlaybackId {
        let points = score_points(score, f64::NEG_INFINITY);
        self.inner.schedule_points(PlaybackId::generate(), points, Some(start))
    }

    /// Schedule the notes of `score` starting at or after score time `from`
    /// under an existing id. System and controller events are always resent
    /// so channel state matches.
    pub fn resume_partitura(&self, id: PlaybackId, score: &ExecutableScore, from: f64) -> PlaybackId {
        self.cancel_playback(&id);
        let points = score_points(score, from);
        self.inner.schedule_points(id, points, None)
    }

    /// Register a single event at score time `at`. A note also gets its
    /// note-off at `at + duration`.
    pub fn schedule_event(&self, event: ScoreEvent, at: f64) -> PlaybackId {
        let points = match event {
            ScoreEvent::Note(note) => {
                let off = at + note.duration.max(0.0);
                let note = Arc::new(note);
                vec![
                    (at, Dispatch::NoteOn(Arc::clone(&note))),
                    (off, Dispatch::NoteOff(note)),
                ]
            }
            ScoreEvent::Cc(event) => vec![(at, Dispatch::Cc(event))],
            ScoreEvent::System(event) => vec![(at, Dispatch::System(event))],
        };
        self.inner.schedule_points(PlaybackId::generate(), points, None)
    }

    /// Cancel every pending dispatch of `id`. Unknown or finished ids are a
    /// no-op; returns whether anything was cancelled.
    pub fn cancel_playback(&self, id: &PlaybackId) -> bool {
        let session = self.inner.sessions.lock().remove(id);
        match session {
            Some(session) => {
                self.inner.teardown(session);
                self.inner.finished.notify_waiters();
                true
            }
            None => {
                debug!(playback = %id, "Cancel of inactive playback ignored");
                false
            }
        }
    }

    /// Cancel every session. Returns how many were active.
    pub fn clear_all(&self) -> usize {
        let sessions: Vec<Session> = self.inner.sessions.lock().drain().map(|(_, s)| s).collect();
        let count = sessions.len();
        for session in sessions {
            self.inner.teardown(session);
        }
        if count > 0 {
            warn!(sessions = count, "Cleared all playback");
        }
        self.inner.finished.notify_waiters();
        count
    }

    pub fn is_active(&self, id: &PlaybackId) -> bool {
        self.inner.sessions.lock().contains_key(id)
    }

    pub fn active_sessions(&self) -> Vec<PlaybackId> {
        self.inner.sessions.lock().keys().cloned().collect()
    }

    /// Resolve once `id` has finished or been cancelled.
    pub async fn wait_for(&self, id: &PlaybackId) {
        loop {
            let finished = self.inner.finished.notified();
            if !self.is_active(id) {
                return;
            }
            finished.await;
        }
    }

    pub fn trigger_note_on(&self, note: &NoteEvent) {
        self.inner.trigger_note(NotePhase::On, note);
    }

    pub fn trigger_note_off(&self, note: &NoteEvent) {
        self.inner.trigger_note(NotePhase::Off, note);
    }

    pub fn trigger_cc_event(&self, event: &CCEvent) {
        self.inner.trigger_cc_event(event);
    }

    pub fn trigger_system_event(&self, event: &SystemEvent) {
        self.inner.trigger_system_event(event);
    }

    pub fn latency_stats(&self) -> LatencyStats {
        self.inner.latency.lock().stats()
    }

    pub fn status(&self) -> SchedulerStatus {
        let (active_sessions, pending_dispatches) = {
            let sessions = self.inner.sessions.lock();
            let pending: usize = sessions.values().map(|s| s.shared.pending()).sum();
            (sessions.len(), pending)
        };
        SchedulerStatus {
            timeline: self.inner.timeline.kind(),
            active_sessions,
            pending_dispatches,
            latency: self.latency_stats(),
        }
    }
}

fn score_points(score: &ExecutableScore, from: f64) -> Vec<(f64, Dispatch)> {
    let mut points = Vec::with_capacity(score.dispatch_count());
    // system and controller events first so a program change at t=0
    // precedes the notes at t=0
    for event in &score.system_events {
        points.push((event.absolute_time, Dispatch::System(event.clone())));
    }
    for event in &score.cc_events {
        points.push((event.absolute_time, Dispatch::Cc(event.clone())));
    }
    for note in score.notes.iter().filter(|n| n.absolute_time >= from) {
        let note = Arc::new(note.clone());
        points.push((note.absolute_time, Dispatch::NoteOn(Arc::clone(&note))));
        points.push((note.note_off_time, Dispatch::NoteOff(note)));
    }
    points
}

impl Inner {
    fn schedule_points(
        self: &Arc<Self>,
        id: PlaybackId,
        mut points: Vec<(f64, Dispatch)>,
        start: Option<f64>,
    ) -> PlaybackId {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let shared = Arc::new(SessionShared::new(id.clone(), points.len()));
        if points.is_empty() {
            debug!(playback = %id, "Nothing to schedule");
            return id;
        }

        // Registered before any timer exists so an immediate dispatch can
        // find (and complete) it.
        self.sessions.lock().insert(
            id.clone(),
            Session {
                shared: Arc::clone(&shared),
                timers: Vec::new(),
            },
        );

        let (wall_now, score_now, rate) = match start {
            Some(start) => self.transport.snapshot_at(start),
            None => self.transport.snapshot(),
        };
        let mut late: usize = 0;
        let mut timers = Vec::with_capacity(points.len());
        let count = points.len();

        for (score_time, dispatch) in points {
            let mut delay = (score_time - score_now) / rate;
            if delay < 0.0 {
                late += 1;
                delay = match self.max_burst {
                    Some(burst) if late > burst => (late - burst) as f64 * BURST_SPACING_SECS,
                    _ => 0.0,
                };
            }
            let at = wall_now + delay;
            let weak: Weak<Inner> = Arc::downgrade(self);
            let session = Arc::clone(&shared);
            let timer = self.timeline.schedule_at(
                at,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire(&session, at, dispatch);
                    }
                }),
            );
            timers.push(timer);
        }

        if late > 0 {
            self.latency.lock().record_late(late as u64);
            debug!(playback = %id, late, "Late events clamped to immediate dispatch");
        }

        let orphaned = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(&id) {
                Some(session) if Arc::ptr_eq(&session.shared, &shared) => {
                    session.timers = timers;
                    Vec::new()
                }
                // finished or cancelled while we were registering
                _ => timers,
            }
        };
        for timer in orphaned {
            self.timeline.cancel(timer);
        }

        info!(playback = %id, dispatches = count, start = score_now, "Scheduled playback");
        id
    }

    fn fire(&self, session: &Arc<SessionShared>, intended: f64, dispatch: Dispatch) {
        if !session.is_active() {
            return;
        }

        let latency_ms = (self.timeline.now() - intended) * 1000.0;
        let (missed, target_ms) = {
            let mut latency = self.latency.lock();
            (latency.record(latency_ms), latency.target_ms())
        };
        if missed {
            warn!(playback = %session.id, latency_ms, target_ms, "Dispatch missed latency target");
        }
        let remaining = session.complete_one();

        match dispatch {
            Dispatch::NoteOn(note) => {
                session.start_note(&note, || self.trigger_note(NotePhase::On, &note));
            }
            Dispatch::NoteOff(note) => {
                session.stop_note(&note);
                self.trigger_note(NotePhase::Off, &note);
            }
            Dispatch::Cc(event) => self.trigger_cc_event(&event),
            Dispatch::System(event) => self.trigger_system_event(&event),
        }

        if remaining == 0 {
            self.finish(session);
        }
    }

    /// Drop the registry entry of a completed session. A listener may have
    /// rescheduled the same id meanwhile; that newer session stays.
    fn finish(&self, session: &Arc<SessionShared>) {
        let removed = {
            let mut sessions = self.sessions.lock();
            match sessions.get(&session.id) {
                Some(entry) if Arc::ptr_eq(&entry.shared, session) => sessions.remove(&session.id),
                _ => None,
            }
        };
        if removed.is_some() {
            info!(playback = %session.id, "Playback finished");
            self.finished.notify_waiters();
        }
    }

    fn teardown(&self, session: Session) {
        let released = session.shared.deactivate();
        let cancelled = session
            .timers
            .iter()
            .filter(|&&timer| self.timeline.cancel(timer))
            .count();
        for note in &released {
            self.trigger_note(NotePhase::Off, note);
        }
        info!(
            playback = %session.shared.id,
            cancelled,
            released = released.len(),
            "Playback cancelled"
        );
    }

    fn trigger_note(&self, phase: NotePhase, note: &NoteEvent) {
        if let Err(e) = self.events.emit_note(phase, note) {
            warn!(error = %e, ?phase, midi = note.midi, channel = note.channel, "Note listener failed");
        }
    }

    fn trigger_cc_event(&self, event: &CCEvent) {
        if let Err(e) = self.events.emit_cc(event) {
            warn!(error = %e, controller = event.controller, "CC listener failed");
        }
    }

    fn trigger_system_event(&self, event: &SystemEvent) {
        if let Err(e) = self.events.emit_system(event) {
            warn!(error = %e, message = ?event.message, "System listener failed");
        }
    }
}
