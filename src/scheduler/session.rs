//! Playback sessions: the pending dispatches of one scheduled score.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use serde::Serialize;
use uuid::Uuid;

use crate::score::{CCEvent, NoteEvent, SystemEvent};
use crate::timeline::TimerId;

/// Opaque handle returned when a score is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PlaybackId(String);

impl PlaybackId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlaybackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// What a timer does when it fires.
#[derive(Debug, Clone)]
pub(crate) enum Dispatch {
    NoteOn(Arc<NoteEvent>),
    NoteOff(Arc<NoteEvent>),
    Cc(CCEvent),
    System(SystemEvent),
}

/// State shared between a session record and its timer callbacks.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub id: PlaybackId,
    active: AtomicBool,
    pending: AtomicUsize,
    /// Notes whose note-on fired and whose note-off has not. Reentrant so a
    /// listener may cancel its own playback from inside a note-on.
    sounding: ReentrantMutex<RefCell<Vec<Arc<NoteEvent>>>>,
}

impl SessionShared {
    pub fn new(id: PlaybackId, dispatches: usize) -> Self {
        Self {
            id,
            active: AtomicBool::new(true),
            pending: AtomicUsize::new(dispatches),
            sounding: ReentrantMutex::new(RefCell::new(Vec::new())),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Mark one dispatch done; returns how many remain.
    pub fn complete_one(&self) -> usize {
        self.pending
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1)
    }

    /// Run `trigger` for a note-on unless the session was cancelled. The
    /// note is tracked as sounding for the duration, so a concurrent cancel
    /// either prevents the note-on or sees it and releases it.
    pub fn start_note(&self, note: &Arc<NoteEvent>, trigger: impl FnOnce()) -> bool {
        let guard = self.sounding.lock();
        if !self.is_active() {
            return false;
        }
        guard.borrow_mut().push(Arc::clone(note));
        trigger();
        true
    }

    pub fn stop_note(&self, note: &Arc<NoteEvent>) {
        let guard = self.sounding.lock();
        guard.borrow_mut().retain(|n| !Arc::ptr_eq(n, note));
    }

    /// Deactivate and return the notes left sounding.
    pub fn deactivate(&self) -> Vec<Arc<NoteEvent>> {
        self.active.store(false, Ordering::Release);
        let guard = self.sounding.lock();
        let released: Vec<_> = guard.borrow_mut().drain(..).collect();
        released
    }
}

/// Scheduler-side record of one playback.
pub(crate) struct Session {
    pub shared: Arc<SessionShared>,
    pub timers: Vec<TimerId>,
}
