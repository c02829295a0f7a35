//! Buffered simulation events.
//!
//! Events are recorded while a step runs and drained by the driver once the
//! step is over. Storage is a fixed-capacity ring buffer, so a driver that
//! never drains loses the oldest events rather than growing without bound.
//!
//! Event kinds can be suppressed via [`EventLog::suppress`], which prevents
//! recording for that kind entirely.

use crate::fixed::{Amount, Ticks};
use crate::id::{ConnectionId, MachineId, RecipeId};

/// Default ring buffer capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CraftStarted {
        machine: MachineId,
        recipe: RecipeId,
        tick: Ticks,
    },
    CraftCompleted {
        machine: MachineId,
        recipe: RecipeId,
        tick: Ticks,
    },
    /// A finished craft is waiting for room in the output buffer.
    OutputBlocked {
        machine: MachineId,
        recipe: RecipeId,
        tick: Ticks,
    },
    Transferred {
        connection: ConnectionId,
        amount: Amount,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CraftStarted,
    CraftCompleted,
    OutputBlocked,
    Transferred,
}

const EVENT_KIND_COUNT: usize = 4;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::CraftStarted { .. } => EventKind::CraftStarted,
            Event::CraftCompleted { .. } => EventKind::CraftCompleted,
            Event::OutputBlocked { .. } => EventKind::OutputBlocked,
            Event::Transferred { .. } => EventKind::Transferred,
        }
    }

    pub fn tick(&self) -> Ticks {
        match *self {
            Event::CraftStarted { tick, .. }
            | Event::CraftCompleted { tick, .. }
            | Event::OutputBlocked { tick, .. }
            | Event::Transferred { tick, .. } => tick,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Ring buffer of events with per-kind suppression and counters.
#[derive(Debug, Clone)]
pub struct EventLog {
    /// Pre-allocated storage.
    events: Vec<Option<Event>>,
    /// Write position (wraps around).
    head: usize,
    /// Number of events currently stored.
    len: usize,
    suppressed: [bool; EVENT_KIND_COUNT],
    /// Events recorded per kind since creation (including dropped).
    emitted: [u64; EVENT_KIND_COUNT],
    dropped: u64,
}

impl EventLog {
    /// Create a log holding at most `capacity` events. A capacity of 0 is
    /// clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            suppressed: [false; EVENT_KIND_COUNT],
            emitted: [0; EVENT_KIND_COUNT],
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stop recording events of `kind`. Already buffered events stay.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
    }

    /// Resume recording events of `kind`.
    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event. If the buffer is full the oldest event is dropped.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        self.emitted[idx] += 1;

        if self.len == self.capacity() {
            self.dropped += 1;
        } else {
            self.len += 1;
        }
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
    }

    /// Events of `kind` recorded since creation.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.emitted[kind.index()]
    }

    /// Events lost because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Iterate from oldest to newest without removing.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        let capacity = self.capacity();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |offset| self.events[(start + offset) % capacity].as_ref())
    }

    /// Remove and return every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        let capacity = self.capacity();
        let start = (self.head + capacity - self.len) % capacity;
        let drained = (0..self.len)
            .filter_map(|offset| self.events[(start + offset) % capacity].take())
            .collect();
        self.head = 0;
        self.len = 0;
        drained
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
