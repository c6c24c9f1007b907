//! Caller-driven clock.
//!
//! Time only moves when [`ManualTimeline::advance_to`] or
//! [`ManualTimeline::advance_by`] is called, which runs every due callback
//! in deadline order on the calling thread. Used by tests and for rendering a
//! score faster than real time.

use std::collections::{BinaryHeap, HashMap};

use parking_lot::Mutex;

use super::{Deadline, Timeline, TimelineKind, TimerCallback, TimerId};

#[derive(Default)]
struct ManualState {
    now: f64,
    next_id: u64,
    queue: BinaryHeap<Deadline>,
    callbacks: HashMap<TimerId, TimerCallback>,
}

#[derive(Default)]
pub struct ManualTimeline {
    state: Mutex<ManualState>,
}

impl ManualTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward to `target`, firing everything due on the way.
    /// Returns the number of callbacks run.
    pub fn advance_to(&self, target: f64) -> usize {
        let mut fired = 0;
        loop {
            let due = {
                let mut state = self.state.lock();
                match state.queue.peek().copied() {
                    Some(next) if next.at <= target => {
                        state.queue.pop();
                        state.now = state.now.max(next.at);
                        state.callbacks.remove(&next.id)
                    }
                    _ => {
                        state.now = state.now.max(target);
                        break;
                    }
                }
            };
            // callbacks may schedule more work, so the lock is released first
            if let Some(callback) = due {
                callback();
                fired += 1;
            }
        }
        fired
    }

    pub fn advance_by(&self, seconds: f64) -> usize {
        let target = self.now() + seconds;
        self.advance_to(target)
    }

    /// Fire everything already due without moving the clock.
    pub fn run_due(&self) -> usize {
        self.advance_to(self.now())
    }
}

impl Timeline for ManualTimeline {
    fn now(&self) -> f64 {
        self.state.lock().now
    }

    fn schedule_at(&self, at: f64, callback: TimerCallback) -> TimerId {
        let mut state = self.state.lock();
        let id = TimerId(state.next_id);
        state.next_id += 1;
        state.callbacks.insert(id, callback);
        state.queue.push(Deadline { at, id });
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let removed = self.state.lock().callbacks.remove(&id);
        removed.is_some()
    }

    fn pending(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    fn kind(&self) -> TimelineKind {
        TimelineKind::Manual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<i32>>>, impl Fn(i32) -> TimerCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |label: i32| -> TimerCallback {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().push(label))
        };
        (log, make)
    }

    #[test]
    fn test_advance_fires_due_in_order() {
        let timeline = ManualTimeline::new();
        let (log, make) = recorder();

        timeline.schedule_at(0.5, make(3));
        timeline.schedule_at(0.0, make(1));
        timeline.schedule_at(0.25, make(2));
        timeline.schedule_at(1.0, make(4));

        assert_eq!(timeline.advance_to(0.5), 3);
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(timeline.now(), 0.5);
        assert_eq!(timeline.pending(), 1);

        timeline.advance_by(1.0);
        assert_eq!(*log.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_equal_deadlines_keep_schedule_order() {
        let timeline = ManualTimeline::new();
        let (log, make) = recorder();
        for label in 0..5 {
            timeline.schedule_at(0.1, make(label));
        }
        timeline.advance_to(0.1);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancel_skips_callback() {
        let timeline = ManualTimeline::new();
        let (log, make) = recorder();
        let id = timeline.schedule_at(0.1, make(1));
        timeline.schedule_at(0.2, make(2));

        assert!(timeline.cancel(id));
        timeline.advance_to(1.0);
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn test_callback_can_schedule_more() {
        let timeline = Arc::new(ManualTimeline::new());
        let (log, make) = recorder();
        let inner = Arc::clone(&timeline);
        let follow_up = make(2);
        let first = make(1);
        timeline.schedule_at(
            0.1,
            Box::new(move || {
                first();
                inner.schedule_at(0.2, follow_up);
            }),
        );

        timeline.advance_to(0.3);
        assert_eq!(*log.lock(), vec![1, 2]);
    }
}
