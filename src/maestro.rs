//! # Orchestrator
//!
//! [`Maestro`] wires a timeline, the [`Transport`], the [`Scheduler`] and an
//! [`EventManager`] together behind one lifecycle:
//!
//! 1. `Maestro::new(config)` - nothing runs yet
//! 2. `initialize().await` - picks the timing backend (engine, else native)
//! 3. `schedule_partitura` / `play_notation` - returns a [`PlaybackId`]
//!    immediately; events reach listeners as they fire
//! 4. `pause` / `play` / `stop` / `set_bpm` / `cancel_playback` / `panic`
//!
//! Scheduling into a stopped transport (or one with nothing in flight)
//! starts it from zero at the score's tempo. Pausing suspends the active
//! playbacks; `play` resumes them from the paused position under the same
//! ids.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use maestro::{Maestro, MaestroConfig, RecordingSink};
//!
//! # async fn run() -> Result<(), maestro::MaestroError> {
//! let maestro = Maestro::new(MaestroConfig::default());
//! maestro.initialize().await?;
//! let sink = Arc::new(RecordingSink::new());
//! let _bridge = maestro.attach_sink(sink.clone());
//!
//! let id = maestro.play_notation("C4:q E4:q G4:h")?;
//! maestro.wait_for(&id).await;
//! assert_eq!(sink.messages().len(), 6);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::api::compile;
use crate::config::MaestroConfig;
use crate::error::MaestroError;
use crate::events::{EventManager, EventStatus};
use crate::scheduler::{PlaybackId, Scheduler, SchedulerStatus};
use crate::score::{ExecutableScore, SystemEvent, SystemMessage};
use crate::sink::{MidiSink, SinkBridge};
use crate::timeline::{select_timeline, Timeline, TimelineKind};
use crate::transport::{Transport, TransportState, TransportStatus};

/// Read-only aggregate of every component's status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_backend: Option<TimelineKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerStatus>,
    pub events: EventStatus,
    pub suspended_playbacks: usize,
}

struct Runtime {
    timeline: Arc<dyn Timeline>,
    transport: Arc<Transport>,
    scheduler: Scheduler,
}

pub struct Maestro {
    config: MaestroConfig,
    events: Arc<EventManager>,
    runtime: RwLock<Option<Arc<Runtime>>>,
    /// Scores of playbacks that may still need rescheduling after a pause
    scores: Mutex<HashMap<PlaybackId, Arc<ExecutableScore>>>,
    suspended: Mutex<Vec<PlaybackId>>,
    resumed: Notify,
}

impl Maestro {
    pub fn new(config: MaestroConfig) -> Self {
        Self {
            config,
            events: Arc::new(EventManager::new()),
            runtime: RwLock::new(None),
            scores: Mutex::new(HashMap::new()),
            suspended: Mutex::new(Vec::new()),
            resumed: Notify::new(),
        }
    }

    /// Bring up the timing backend. Calling it again is a no-op.
    pub async fn initialize(&self) -> Result<(), MaestroError> {
        if self.is_initialized() {
            return Ok(());
        }
        let timeline = select_timeline(&self.config.timing).await?;
        self.initialize_with_timeline(timeline);
        Ok(())
    }

    /// Initialize on a caller-supplied timeline, e.g. a
    /// [`crate::ManualTimeline`] for offline rendering.
    pub fn initialize_with_timeline(&self, timeline: Arc<dyn Timeline>) {
        let mut slot = self.runtime.write();
        if slot.is_some() {
            return;
        }
        let transport = Arc::new(Transport::new(
            Arc::clone(&timeline),
            self.config.defaults.bpm,
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&timeline),
            Arc::clone(&transport),
            Arc::clone(&self.events),
            &self.config.latency,
        );
        info!(backend = %timeline.kind(), "Maestro initialized");
        *slot = Some(Arc::new(Runtime {
            timeline,
            transport,
            scheduler,
        }));
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.read().is_some()
    }

    fn runtime(&self) -> Result<Arc<Runtime>, MaestroError> {
        self.runtime
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(MaestroError::NotInitialized)
    }

    pub fn config(&self) -> &MaestroConfig {
        &self.config
    }

    /// Listener registry; subscribe here to receive fired events.
    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn attach_sink(&self, sink: Arc<dyn MidiSink>) -> SinkBridge {
        SinkBridge::attach(&self.events, sink)
    }

    pub fn scheduler(&self) -> Result<Scheduler, MaestroError> {
        Ok(self.runtime()?.scheduler.clone())
    }

    pub fn transport(&self) -> Result<Arc<Transport>, MaestroError> {
        Ok(Arc::clone(&self.runtime()?.transport))
    }

    /// Start, or resume suspended playbacks after a pause.
    pub fn play(&self) -> Result<(), MaestroError> {
        let runtime = self.runtime()?;
        let was = runtime.transport.state();
        runtime.transport.play();

        if was == TransportState::Paused {
            let from = runtime.transport.current_time();
            let suspended: Vec<PlaybackId> = std::mem::take(&mut *self.suspended.lock());
            for id in suspended {
                let score = self.scores.lock().get(&id).cloned();
                if let Some(score) = score {
                    runtime.scheduler.resume_partitura(id, &score, from);
                }
            }
            self.resumed.notify_waiters();
        }
        Ok(())
    }

    /// Freeze the position and suspend everything in flight.
    pub fn pause(&self) -> Result<(), MaestroError> {
        let runtime = self.runtime()?;
        if runtime.transport.state() != TransportState::Playing {
            return Ok(());
        }
        runtime.transport.pause();
        let held: Vec<PlaybackId> = runtime
            .scheduler
            .active_sessions()
            .into_iter()
            .filter(|id| runtime.scheduler.cancel_playback(id))
            .filter(|id| self.scores.lock().contains_key(id))
            .collect();
        let mut suspended = self.suspended.lock();
        suspended.extend(held);
        info!(suspended = suspended.len(), "Playback paused");
        Ok(())
    }

    /// Cancel everything and rewind.
    pub fn stop(&self) -> Result<(), MaestroError> {
        let runtime = self.runtime()?;
        runtime.scheduler.clear_all();
        runtime.transport.stop();
        self.forget_all();
        Ok(())
    }

    pub fn set_bpm(&self, bpm: f64) -> Result<(), MaestroError> {
        self.runtime()?.transport.set_bpm(bpm);
        Ok(())
    }

    /// Schedule a translated score. Returns as soon as every event is
    /// registered.
    pub fn schedule_partitura(&self, score: ExecutableScore) -> Result<PlaybackId, MaestroError> {
        let runtime = self.runtime()?;
        self.prune_finished(&runtime.scheduler);

        let idle = runtime.scheduler.active_sessions().is_empty() && self.suspended.lock().is_empty();
        // a score that starts the transport is timed from that instant
        let started = match runtime.transport.state() {
            TransportState::Stopped => {
                runtime.transport.load_tempo(score.metadata.bpm);
                Some(runtime.transport.play())
            }
            TransportState::Playing if idle => {
                runtime.transport.stop();
                runtime.transport.load_tempo(score.metadata.bpm);
                Some(runtime.transport.play())
            }
            TransportState::Paused => {
                warn!("Scheduling while paused; events are held until play");
                None
            }
            TransportState::Playing => None,
        };

        let score = Arc::new(score);
        // held scores join the suspended set and start at the paused position
        let id = if runtime.transport.state() == TransportState::Paused {
            let id = PlaybackId::generate();
            self.suspended.lock().push(id.clone());
            id
        } else if let Some(start) = started {
            runtime.scheduler.schedule_partitura_at(&score, start)
        } else {
            runtime.scheduler.schedule_partitura(&score)
        };
        self.scores.lock().insert(id.clone(), score);
        Ok(id)
    }

    /// Compile `notation` with the configured defaults and schedule it.
    pub fn play_notation(&self, notation: &str) -> Result<PlaybackId, MaestroError> {
        let score = compile(notation, &self.config.defaults)?;
        self.schedule_partitura(score)
    }

    /// Cancel one playback. Unknown ids are ignored.
    pub fn cancel_playback(&self, id: &PlaybackId) -> Result<bool, MaestroError> {
        let runtime = self.runtime()?;
        let was_suspended = {
            let mut suspended = self.suspended.lock();
            let before = suspended.len();
            suspended.retain(|s| s != id);
            before != suspended.len()
        };
        self.scores.lock().remove(id);
        let cancelled = runtime.scheduler.cancel_playback(id) || was_suspended;
        if was_suspended {
            self.resumed.notify_waiters();
        }
        Ok(cancelled)
    }

    /// Emergency stop: cancel everything, rewind, and tell every system
    /// listener to silence all notes.
    pub fn panic(&self) {
        if let Ok(runtime) = self.runtime() {
            runtime.scheduler.clear_all();
            runtime.transport.stop();
        }
        self.forget_all();
        let all_off = SystemEvent {
            absolute_time: 0.0,
            message: SystemMessage::AllNotesOff,
            channel: None,
        };
        if let Err(e) = self.events.emit_system(&all_off) {
            warn!(error = %e, "All-notes-off listener failed");
        }
        warn!("Panic: all playback stopped");
    }

    /// Resolve once `id` has finished or been cancelled. A suspended
    /// playback is still waiting.
    pub async fn wait_for(&self, id: &PlaybackId) {
        let Ok(scheduler) = self.scheduler() else {
            return;
        };
        loop {
            let resumed = self.resumed.notified();
            scheduler.wait_for(id).await;
            if !self.suspended.lock().contains(id) {
                return;
            }
            resumed.await;
        }
    }

    pub fn status(&self) -> SystemStatus {
        let runtime = self.runtime.read().as_ref().map(Arc::clone);
        SystemStatus {
            initialized: runtime.is_some(),
            timing_backend: runtime.as_ref().map(|r| r.timeline.kind()),
            transport: runtime.as_ref().map(|r| r.transport.status()),
            scheduler: runtime.as_ref().map(|r| r.scheduler.status()),
            events: self.events.status(),
            suspended_playbacks: self.suspended.lock().len(),
        }
    }

    fn prune_finished(&self, scheduler: &Scheduler) {
        let suspended = self.suspended.lock().clone();
        self.scores
            .lock()
            .retain(|id, _| scheduler.is_active(id) || suspended.contains(id));
    }

    fn forget_all(&self) {
        self.scores.lock().clear();
        self.suspended.lock().clear();
        self.resumed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NotePhase;
    use crate::sink::{MidiMessage, RecordingSink};
    use crate::timeline::ManualTimeline;

    fn manual_maestro() -> (Arc<ManualTimeline>, Maestro) {
        let clock = Arc::new(ManualTimeline::new());
        let maestro = Maestro::new(MaestroConfig::default());
        maestro.initialize_with_timeline(clock.clone());
        (clock, maestro)
    }

    fn note_ons(sink: &RecordingSink) -> Vec<u8> {
        sink.messages()
            .into_iter()
            .filter_map(|m| match m {
                MidiMessage::NoteOn { note, .. } => Some(note),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_requires_initialize() {
        let maestro = Maestro::new(MaestroConfig::default());
        assert!(matches!(
            maestro.play_notation("C4"),
            Err(MaestroError::NotInitialized)
        ));
        assert!(matches!(maestro.play(), Err(MaestroError::NotInitialized)));
        let status = maestro.status();
        assert!(!status.initialized);
        assert!(status.transport.is_none());
    }

    #[test]
    fn test_play_notation_end_to_end() {
        let (clock, maestro) = manual_maestro();
        let sink = Arc::new(RecordingSink::new());
        let _bridge = maestro.attach_sink(sink.clone());

        let id = maestro.play_notation("C4:q E4:q G4:h").unwrap();
        assert_eq!(maestro.transport().unwrap().state(), TransportState::Playing);
        clock.advance_to(10.0);

        assert_eq!(note_ons(&sink), vec![60, 64, 67]);
        assert_eq!(sink.messages().len(), 6);
        assert!(!maestro.scheduler().unwrap().is_active(&id));
    }

    #[test]
    fn test_notation_errors_surface() {
        let (_, maestro) = manual_maestro();
        assert!(matches!(
            maestro.play_notation("H4:q"),
            Err(MaestroError::Notation(_))
        ));
    }

    #[test]
    fn test_pause_and_resume() {
        let (clock, maestro) = manual_maestro();
        let sink = Arc::new(RecordingSink::new());
        let _bridge = maestro.attach_sink(sink.clone());

        let id = maestro.play_notation("C4:q D4:q E4:q F4:q").unwrap();
        clock.advance_to(0.6);
        maestro.pause().unwrap();
        assert_eq!(maestro.status().suspended_playbacks, 1);

        // nothing plays while paused
        clock.advance_to(5.0);
        assert_eq!(note_ons(&sink), vec![60, 62]);

        maestro.play().unwrap();
        clock.advance_to(10.0);
        assert_eq!(note_ons(&sink), vec![60, 62, 64, 65]);
        assert!(!maestro.scheduler().unwrap().is_active(&id));
        assert_eq!(maestro.status().suspended_playbacks, 0);
    }

    #[test]
    fn test_panic_silences_everything() {
        let (clock, maestro) = manual_maestro();
        let sink = Arc::new(RecordingSink::new());
        let _bridge = maestro.attach_sink(sink.clone());

        maestro.play_notation("C4:w").unwrap();
        clock.advance_to(0.1);
        maestro.panic();

        let messages = sink.messages();
        assert!(messages.contains(&MidiMessage::NoteOff { channel: 1, note: 60 }));
        // 16 channels x (all sound off + all notes off)
        let controls = messages
            .iter()
            .filter(|m| matches!(m, MidiMessage::ControlChange { .. }))
            .count();
        assert_eq!(controls, 32);
        assert_eq!(maestro.transport().unwrap().state(), TransportState::Stopped);
        assert_eq!(maestro.status().scheduler.unwrap().active_sessions, 0);
    }

    #[test]
    fn test_cancel_playback_is_idempotent() {
        let (clock, maestro) = manual_maestro();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        maestro.events().on_note(move |phase, _| {
            if phase == NotePhase::On {
                counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Ok(())
        });

        let id = maestro.play_notation("C4 D4 E4 F4 G4 A4 B4 C5 D5 E5").unwrap();
        assert!(maestro.cancel_playback(&id).unwrap());
        assert!(!maestro.cancel_playback(&id).unwrap());
        assert!(!maestro.cancel_playback(&PlaybackId::from("unknown")).unwrap());
        clock.advance_to(30.0);
        assert_eq!(count.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn test_status_aggregates() {
        let (clock, maestro) = manual_maestro();
        maestro.play_notation("C4 D4").unwrap();
        clock.advance_to(5.0);

        let status = maestro.status();
        assert!(status.initialized);
        assert_eq!(status.timing_backend, Some(TimelineKind::Manual));
        assert_eq!(status.events.note_on_events, 2);
        assert_eq!(status.scheduler.as_ref().unwrap().latency.total_dispatches, 6);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["transport"]["state"], "playing");
        assert_eq!(json["timingBackend"], "manual");
    }

    #[tokio::test]
    async fn test_initialize_native_and_wait() {
        let mut config = MaestroConfig::default();
        config.timing.prefer_engine = false;
        let maestro = Maestro::new(config);
        maestro.initialize().await.unwrap();
        maestro.initialize().await.unwrap();
        assert_eq!(maestro.status().timing_backend, Some(TimelineKind::Native));

        let sink = Arc::new(RecordingSink::new());
        let _bridge = maestro.attach_sink(sink.clone());
        let id = maestro.play_notation("C5:s D5:s").unwrap();
        maestro.wait_for(&id).await;
        assert_eq!(note_ons(&sink), vec![72, 74]);
    }
}
