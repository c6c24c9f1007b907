//! Event fan-out.
//!
//! The scheduler hands every fired event to the [`EventManager`], which
//! forwards it to the listeners registered for that event type, in
//! registration order. A failing listener is counted and logged but does not
//! stop the ones after it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::SinkError;
use crate::score::{CCEvent, NoteEvent, SystemEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotePhase {
    On,
    Off,
}

type NoteListener = Arc<dyn Fn(NotePhase, &NoteEvent) -> Result<(), SinkError> + Send + Sync>;
type CcListener = Arc<dyn Fn(&CCEvent) -> Result<(), SinkError> + Send + Sync>;
type SystemListener = Arc<dyn Fn(&SystemEvent) -> Result<(), SinkError> + Send + Sync>;

#[derive(Default)]
struct Listeners {
    note: Vec<(ListenerId, NoteListener)>,
    cc: Vec<(ListenerId, CcListener)>,
    system: Vec<(ListenerId, SystemListener)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStatus {
    pub note_on_events: u64,
    pub note_off_events: u64,
    pub cc_events: u64,
    pub system_events: u64,
    pub note_listeners: usize,
    pub cc_listeners: usize,
    pub system_listeners: usize,
    pub listener_errors: u64,
}

#[derive(Default)]
pub struct EventManager {
    listeners: RwLock<Listeners>,
    next_id: AtomicU64,
    note_on: AtomicU64,
    note_off: AtomicU64,
    cc: AtomicU64,
    system: AtomicU64,
    errors: AtomicU64,
}

/// Call each listener, keep going past failures, return the first error.
fn fan_out<L>(
    listeners: &[L],
    errors: &AtomicU64,
    mut call: impl FnMut(&L) -> Result<(), SinkError>,
) -> Result<(), SinkError> {
    let mut first = None;
    for listener in listeners {
        if let Err(e) = call(listener) {
            errors.fetch_add(1, Ordering::Relaxed);
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn on_note<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(NotePhase, &NoteEvent) -> Result<(), SinkError> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.listeners.write().note.push((id, Arc::new(listener)));
        id
    }

    pub fn on_cc<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CCEvent) -> Result<(), SinkError> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.listeners.write().cc.push((id, Arc::new(listener)));
        id
    }

    pub fn on_system<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SystemEvent) -> Result<(), SinkError> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.listeners.write().system.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener of any type. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.note.len() + listeners.cc.len() + listeners.system.len();
        listeners.note.retain(|(lid, _)| *lid != id);
        listeners.cc.retain(|(lid, _)| *lid != id);
        listeners.system.retain(|(lid, _)| *lid != id);
        before != listeners.note.len() + listeners.cc.len() + listeners.system.len()
    }

    // Listeners are snapshotted so they can (un)subscribe while being called.

    pub fn emit_note(&self, phase: NotePhase, note: &NoteEvent) -> Result<(), SinkError> {
        match phase {
            NotePhase::On => self.note_on.fetch_add(1, Ordering::Relaxed),
            NotePhase::Off => self.note_off.fetch_add(1, Ordering::Relaxed),
        };
        let listeners: Vec<NoteListener> =
            self.listeners.read().note.iter().map(|(_, l)| Arc::clone(l)).collect();
        fan_out(&listeners, &self.errors, |l| l(phase, note))
    }

    pub fn emit_cc(&self, event: &CCEvent) -> Result<(), SinkError> {
        self.cc.fetch_add(1, Ordering::Relaxed);
        let listeners: Vec<CcListener> =
            self.listeners.read().cc.iter().map(|(_, l)| Arc::clone(l)).collect();
        fan_out(&listeners, &self.errors, |l| l(event))
    }

    pub fn emit_system(&self, event: &SystemEvent) -> Result<(), SinkError> {
        self.system.fetch_add(1, Ordering::Relaxed);
        let listeners: Vec<SystemListener> =
            self.listeners.read().system.iter().map(|(_, l)| Arc::clone(l)).collect();
        fan_out(&listeners, &self.errors, |l| l(event))
    }

    pub fn status(&self) -> EventStatus {
        let listeners = self.listeners.read();
        EventStatus {
            note_on_events: self.note_on.load(Ordering::Relaxed),
            note_off_events: self.note_off.load(Ordering::Relaxed),
            cc_events: self.cc.load(Ordering::Relaxed),
            system_events: self.system.load(Ordering::Relaxed),
            note_listeners: listeners.note.len(),
            cc_listeners: listeners.cc.len(),
            system_listeners: listeners.system.len(),
            listener_errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
