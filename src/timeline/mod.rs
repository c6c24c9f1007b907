//! # Timeline Module
//!
//! A timeline is a clock plus the ability to run a callback at a future
//! instant and cancel it before it fires. Transport and Scheduler only ever
//! see `Arc<dyn Timeline>`; which backend sits behind it is decided once in
//! [`select_timeline`].
//!
//! ## Backends
//! - [`EngineTimeline`] - dedicated clock thread, condvar sleep then spin
//! - [`NativeTimeline`] - one tokio driver task over a deadline heap
//! - [`ManualTimeline`] - caller-advanced clock for tests and offline rendering
//!
//! All times are seconds since the timeline's own origin.

mod engine;
mod manual;
mod native;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::TimingConfig;
use crate::error::TimelineError;

pub use engine::EngineTimeline;
pub use manual::ManualTimeline;
pub use native::NativeTimeline;

/// Work to run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle for a scheduled callback, unique within one timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerId(pub(crate) u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineKind {
    Engine,
    Native,
    Manual,
}

impl fmt::Display for TimelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimelineKind::Engine => "engine",
            TimelineKind::Native => "native",
            TimelineKind::Manual => "manual",
        };
        f.write_str(name)
    }
}

pub trait Timeline: Send + Sync {
    /// Seconds since this timeline's origin.
    fn now(&self) -> f64;

    /// Run `callback` once `now() >= at`. A time in the past fires as soon
    /// as possible.
    fn schedule_at(&self, at: f64, callback: TimerCallback) -> TimerId;

    /// Drop a pending callback. Returns false if it already fired or was
    /// never scheduled.
    fn cancel(&self, id: TimerId) -> bool;

    /// Callbacks registered but not yet fired or cancelled.
    fn pending(&self) -> usize;

    fn kind(&self) -> TimelineKind;
}

/// Heap entry ordered so that `BinaryHeap` pops the earliest deadline first,
/// ties broken by scheduling order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    pub at: f64,
    pub id: TimerId,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Deadline {}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pick the timing backend for this process.
///
/// Tries the engine first when `prefer_engine` is set; any startup failure
/// is logged and the native backend is used instead.
pub async fn select_timeline(config: &TimingConfig) -> Result<Arc<dyn Timeline>, TimelineError> {
    if config.prefer_engine {
        let spin = Duration::from_micros(config.spin_threshold_us);
        let timeout = Duration::from_millis(config.engine_startup_timeout_ms);
        match EngineTimeline::start(spin, timeout).await {
            Ok(engine) => {
                info!(spin_us = config.spin_threshold_us, "Using engine timeline");
                return Ok(Arc::new(engine));
            }
            Err(e) => warn!(error = %e, "Engine timeline unavailable, falling back to native timers"),
        }
    }
    let native = NativeTimeline::current()?;
    info!("Using native timeline");
    Ok(Arc::new(native))
}
