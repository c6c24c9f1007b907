//! High-precision clock thread.
//!
//! Timers live in a deadline heap guarded by a `parking_lot` mutex. The
//! thread sleeps on a condvar until it is within `spin_threshold` of the next
//! deadline, then busy-waits the rest of the way. Callbacks run outside the
//! lock, so they may schedule or cancel further timers.

use std::collections::{BinaryHeap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::{Deadline, Timeline, TimelineKind, TimerCallback, TimerId};
use crate::error::TimelineError;

#[derive(Default)]
struct ClockState {
    queue: BinaryHeap<Deadline>,
    callbacks: HashMap<TimerId, TimerCallback>,
    shutdown: bool,
}

struct Clock {
    origin: Instant,
    spin_threshold: f64,
    state: Mutex<ClockState>,
    wake: Condvar,
}

impl Clock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                break;
            }
            let Some(next) = state.queue.peek().copied() else {
                self.wake.wait(&mut state);
                continue;
            };
            if !state.callbacks.contains_key(&next.id) {
                // cancelled
                state.queue.pop();
                continue;
            }

            let remaining = next.at - self.now();
            if remaining > self.spin_threshold {
                let sleep = Duration::from_secs_f64(remaining - self.spin_threshold);
                self.wake.wait_for(&mut state, sleep);
                continue;
            }
            if remaining > 0.0 {
                MutexGuard::unlocked(&mut state, || {
                    while self.now() < next.at {
                        std::hint::spin_loop();
                    }
                });
                // an earlier timer may have arrived while spinning
                continue;
            }

            state.queue.pop();
            if let Some(callback) = state.callbacks.remove(&next.id) {
                MutexGuard::unlocked(&mut state, || {
                    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                        error!(timer = %next.id, "Timer callback panicked");
                    }
                });
            }
        }
        debug!("Clock thread stopped");
    }
}

/// Preferred timing backend: a dedicated thread driving a deadline heap.
pub struct EngineTimeline {
    clock: Arc<Clock>,
    next_id: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EngineTimeline {
    /// Spawn the clock thread without waiting for it to come up.
    pub fn spawn(spin_threshold: Duration) -> Result<Self, TimelineError> {
        Self::spawn_with_ready(spin_threshold, None)
    }

    /// Spawn the clock thread and wait up to `timeout` for it to report ready.
    pub async fn start(spin_threshold: Duration, timeout: Duration) -> Result<Self, TimelineError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let engine = Self::spawn_with_ready(spin_threshold, Some(ready_tx))?;
        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(())) => Ok(engine),
            Ok(Err(_)) => Err(TimelineError::Stopped),
            Err(_) => Err(TimelineError::StartupTimeout(timeout)),
        }
    }

    fn spawn_with_ready(
        spin_threshold: Duration,
        ready: Option<oneshot::Sender<()>>,
    ) -> Result<Self, TimelineError> {
        let clock = Arc::new(Clock {
            origin: Instant::now(),
            spin_threshold: spin_threshold.as_secs_f64(),
            state: Mutex::new(ClockState::default()),
            wake: Condvar::new(),
        });

        let thread = {
            let clock = Arc::clone(&clock);
            thread::Builder::new()
                .name("maestro-clock".to_string())
                .spawn(move || {
                    if let Some(ready) = ready {
                        let _ = ready.send(());
                    }
                    clock.run();
                })?
        };

        Ok(Self {
            clock,
            next_id: AtomicU64::new(0),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn shutdown(&self) {
        let dropped = {
            let mut state = self.clock.state.lock();
            state.shutdown = true;
            state.queue.clear();
            std::mem::take(&mut state.callbacks)
        };
        self.clock.wake.notify_all();
        drop(dropped);

        if let Some(handle) = self.thread.lock().take() {
            // the last owner can be dropped from inside a callback
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Timeline for EngineTimeline {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn schedule_at(&self, at: f64, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut state = self.clock.state.lock();
            state.callbacks.insert(id, callback);
            state.queue.push(Deadline { at, id });
        }
        self.clock.wake.notify_one();
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let removed = self.clock.state.lock().callbacks.remove(&id);
        match removed {
            Some(_) => {
                self.clock.wake.notify_one();
                true
            }
            None => false,
        }
    }

    fn pending(&self) -> usize {
        self.clock.state.lock().callbacks.len()
    }

    fn kind(&self) -> TimelineKind {
        TimelineKind::Engine
    }
}

impl Drop for EngineTimeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn engine() -> EngineTimeline {
        EngineTimeline::spawn(Duration::from_micros(500)).unwrap()
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let timeline = engine();
        let (tx, rx) = mpsc::channel();
        let start = timeline.now();

        for (label, offset) in [(2, 0.030), (0, 0.010), (1, 0.020)] {
            let tx = tx.clone();
            timeline.schedule_at(
                start + offset,
                Box::new(move || {
                    let _ = tx.send(label);
                }),
            );
        }

        let order: Vec<i32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(timeline.pending(), 0);
    }

    #[test]
    fn test_never_fires_early() {
        let timeline = engine();
        let (tx, rx) = mpsc::channel();
        let target = timeline.now() + 0.015;
        let clock = Arc::clone(&timeline.clock);
        timeline.schedule_at(
            target,
            Box::new(move || {
                let _ = tx.send(clock.now());
            }),
        );
        let fired = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(fired >= target);
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let timeline = engine();
        let (tx, rx) = mpsc::channel::<()>();
        let id = timeline.schedule_at(
            timeline.now() + 0.02,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(timeline.cancel(id));
        assert!(!timeline.cancel(id));
        assert!(rx.recv_timeout(Duration::from_millis(60)).is_err());
    }

    #[test]
    fn test_past_deadline_fires_immediately() {
        let timeline = engine();
        let (tx, rx) = mpsc::channel();
        timeline.schedule_at(
            -1.0,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_ok());
    }

    #[tokio::test]
    async fn test_start_handshake() {
        let timeline = EngineTimeline::start(Duration::from_micros(500), Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(timeline.kind(), TimelineKind::Engine);
    }
}
