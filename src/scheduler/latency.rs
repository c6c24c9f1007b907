//! Dispatch latency tracking over a fixed-size history.

use serde::Serialize;

/// Fixed-capacity circular buffer; pushing into a full buffer overwrites the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    next: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.next] = item;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let split = if self.items.len() < self.capacity { 0 } else { self.next };
        self.items[split..].iter().chain(self.items[..split].iter())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next = 0;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    /// Samples currently in the history
    pub samples: usize,
    /// Dispatches measured since startup
    pub total_dispatches: u64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub target_ms: f64,
    pub violations: u64,
    pub late_dispatches: u64,
}

#[derive(Debug, Clone)]
pub struct LatencyTracker {
    history: RingBuffer<f64>,
    target_ms: f64,
    total: u64,
    violations: u64,
    late: u64,
}

impl LatencyTracker {
    pub fn new(history: usize, target_ms: f64) -> Self {
        Self {
            history: RingBuffer::new(history),
            target_ms,
            total: 0,
            violations: 0,
            late: 0,
        }
    }

    /// Record one dispatch. Returns true if it missed the target.
    pub fn record(&mut self, latency_ms: f64) -> bool {
        let latency_ms = latency_ms.max(0.0);
        self.history.push(latency_ms);
        self.total += 1;
        let missed = latency_ms > self.target_ms;
        if missed {
            self.violations += 1;
        }
        missed
    }

    /// Events whose time had already passed when they were scheduled.
    pub fn record_late(&mut self, count: u64) {
        self.late += count;
    }

    pub fn target_ms(&self) -> f64 {
        self.target_ms
    }

    pub fn stats(&self) -> LatencyStats {
        let samples = self.history.len();
        let (sum, min, max) = self.history.iter().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, min, max), &v| (sum + v, min.min(v), max.max(v)),
        );
        let (average_ms, min_ms, max_ms) = if samples == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (sum / samples as f64, min, max)
        };
        LatencyStats {
            samples,
            total_dispatches: self.total,
            average_ms,
            min_ms,
            max_ms,
            target_ms: self.target_ms,
            violations: self.violations,
            late_dispatches: self.late,
        }
    }
}
