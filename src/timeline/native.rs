//! Fallback timers on the tokio runtime.
//!
//! One driver task owns the deadline heap and runs callbacks one at a time
//! in deadline order, sleeping with `sleep_until` until the earliest entry
//! is due. Scheduling or cancelling wakes it through a `Notify`.

use std::collections::{BinaryHeap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error};

use super::{Deadline, Timeline, TimelineKind, TimerCallback, TimerId};
use crate::error::TimelineError;

#[derive(Default)]
struct DriverState {
    queue: BinaryHeap<Deadline>,
    callbacks: HashMap<TimerId, TimerCallback>,
    shutdown: bool,
}

struct Driver {
    origin: Instant,
    state: Mutex<DriverState>,
    wake: Notify,
}

impl Driver {
    fn deadline(&self, at: f64) -> Instant {
        self.origin + Duration::from_secs_f64(at.max(0.0))
    }

    /// Earliest live deadline; cancelled entries are discarded on the way.
    fn peek_live(&self) -> Option<Option<Deadline>> {
        let mut state = self.state.lock();
        if state.shutdown {
            return None;
        }
        while let Some(next) = state.queue.peek().copied() {
            if state.callbacks.contains_key(&next.id) {
                return Some(Some(next));
            }
            state.queue.pop();
        }
        Some(None)
    }

    fn take_if_first(&self, next: Deadline) -> Option<TimerCallback> {
        let mut state = self.state.lock();
        match state.queue.peek() {
            Some(top) if top.id == next.id => {
                state.queue.pop();
                state.callbacks.remove(&next.id)
            }
            _ => None,
        }
    }

    async fn run(self: Arc<Self>) {
        while let Some(next) = self.peek_live() {
            let Some(next) = next else {
                self.wake.notified().await;
                continue;
            };

            let deadline = self.deadline(next.at);
            if Instant::now() < deadline {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = self.wake.notified() => {}
                }
                // an earlier timer may have arrived meanwhile
                continue;
            }

            if let Some(callback) = self.take_if_first(next) {
                if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    error!(timer = %next.id, "Timer callback panicked");
                }
            }
        }
        debug!("Native timer driver stopped");
    }
}

pub struct NativeTimeline {
    driver: Arc<Driver>,
    next_id: AtomicU64,
    task: AbortHandle,
}

impl NativeTimeline {
    pub fn new(runtime: Handle) -> Self {
        let driver = Arc::new(Driver {
            origin: Instant::now(),
            state: Mutex::new(DriverState::default()),
            wake: Notify::new(),
        });
        let task = runtime.spawn(Arc::clone(&driver).run()).abort_handle();
        Self {
            driver,
            next_id: AtomicU64::new(0),
            task,
        }
    }

    /// Bind to the runtime the caller is running on.
    pub fn current() -> Result<Self, TimelineError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| TimelineError::NoRuntime)
    }
}

impl Timeline for NativeTimeline {
    fn now(&self) -> f64 {
        self.driver.origin.elapsed().as_secs_f64()
    }

    fn schedule_at(&self, at: f64, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut state = self.driver.state.lock();
            state.callbacks.insert(id, callback);
            state.queue.push(Deadline { at, id });
        }
        self.driver.wake.notify_one();
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let removed = self.driver.state.lock().callbacks.remove(&id);
        match removed {
            Some(_) => {
                self.driver.wake.notify_one();
                true
            }
            None => false,
        }
    }

    fn pending(&self) -> usize {
        self.driver.state.lock().callbacks.len()
    }

    fn kind(&self) -> TimelineKind {
        TimelineKind::Native
    }
}

impl Drop for NativeTimeline {
    fn drop(&mut self) {
        let dropped = {
            let mut state = self.driver.state.lock();
            state.shutdown = true;
            state.queue.clear();
            std::mem::take(&mut state.callbacks)
        };
        self.driver.wake.notify_one();
        self.task.abort();
        drop(dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::compile;
    use crate::config::LatencyConfig;
    use crate::events::{EventManager, NotePhase};
    use crate::notation::GlobalDefaults;
    use crate::scheduler::Scheduler;
    use crate::transport::Transport;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_fires_in_order() {
        let timeline = NativeTimeline::current().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = timeline.now();

        for (label, offset) in [(1, 0.02), (0, 0.005), (2, 0.04)] {
            let tx = tx.clone();
            timeline.schedule_at(
                start + offset,
                Box::new(move || {
                    let _ = tx.send(label);
                }),
            );
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(label) = rx.recv().await {
            order.push(label);
        }
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(timeline.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancel() {
        let timeline = NativeTimeline::current().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let id = timeline.schedule_at(
            timeline.now() + 0.01,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert_eq!(timeline.pending(), 1);
        assert!(timeline.cancel(id));
        assert!(!timeline.cancel(id));
        // the cancelled callback is dropped with its sender
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            NativeTimeline::current(),
            Err(TimelineError::NoRuntime)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_instant_runs_serially_in_schedule_order() {
        let timeline = NativeTimeline::current().unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let at = timeline.now() - 0.1;
        for label in 0..64 {
            let (in_flight, overlaps, tx) = (in_flight.clone(), overlaps.clone(), tx.clone());
            timeline.schedule_at(
                at,
                Box::new(move || {
                    if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_micros(50));
                    let _ = tx.send(label);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }),
            );
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(label) = rx.recv().await {
            order.push(label);
        }
        assert_eq!(order, (0..64).collect::<Vec<_>>());
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_score_keeps_note_on_before_off() {
        let timeline: Arc<dyn Timeline> = Arc::new(NativeTimeline::current().unwrap());
        let transport = Arc::new(Transport::new(Arc::clone(&timeline), 120.0));
        let events = Arc::new(EventManager::new());
        let scheduler = Scheduler::new(
            Arc::clone(&timeline),
            Arc::clone(&transport),
            Arc::clone(&events),
            &LatencyConfig::default(),
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = Arc::clone(&log);
            events.on_note(move |phase, note| {
                log.lock().push((phase, note.midi));
                Ok(())
            });
        }

        transport.play();
        // the whole score (0.5s) is in the past from here on
        tokio::time::sleep(Duration::from_millis(600)).await;
        let score = compile("C4:s D4:s E4:s F4:s", &GlobalDefaults::default()).unwrap();

        for _ in 0..20 {
            log.lock().clear();
            let id = scheduler.schedule_partitura(&score);
            scheduler.wait_for(&id).await;

            let fired = log.lock().clone();
            assert_eq!(fired.len(), 8);
            for midi in [60, 62, 64, 65] {
                let on = fired.iter().position(|e| *e == (NotePhase::On, midi));
                let off = fired.iter().position(|e| *e == (NotePhase::Off, midi));
                assert!(on < off, "note {} released before it started", midi);
            }
            let ons: Vec<u8> = fired
                .iter()
                .filter(|e| e.0 == NotePhase::On)
                .map(|e| e.1)
                .collect();
            assert_eq!(ons, vec![60, 62, 64, 65]);
        }
    }
}
