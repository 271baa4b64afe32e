//! Chain event stream.
//!
//! A single-producer, many-consumer append-only log. The writer pushes one
//! event per committed header; subscribers hold a cursor into the shared
//! log and observe events in the exact order they were committed. One empty
//! sentinel event is pushed at construction to signal readiness. The log is
//! in-memory only.

use fugue_types::Header;
use num_bigint::BigUint;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// What a chain event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EventKind {
    /// The canonical chain was extended
    #[default]
    Head,
    /// A non-canonical branch gained a header
    Fork,
    /// A heavier branch replaced a suffix of the canonical chain
    Reorg,
}

/// A committed chain change.
#[derive(Clone, Debug, Default)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Headers newly on the canonical chain, ascending by number
    pub new_chain: Vec<Header>,
    /// Headers newly off the canonical chain, descending from the prior
    /// head; for a fork, the side header itself
    pub old_chain: Vec<Header>,
    /// Total difficulty of the new head, when the head moved
    pub difficulty: Option<BigUint>,
}

impl Event {
    /// Append a header to the new-chain list.
    pub fn add_new_header(&mut self, header: Header) {
        self.new_chain.push(header);
    }

    /// Append a header to the old-chain list.
    pub fn add_old_header(&mut self, header: Header) {
        self.old_chain.push(header);
    }

    /// Record the new head total difficulty.
    pub fn set_difficulty(&mut self, td: BigUint) {
        self.difficulty = Some(td);
    }
}

#[derive(Default)]
struct StreamInner {
    events: Mutex<Vec<Arc<Event>>>,
    cond: Condvar,
}

/// Handle to the shared append-only event log. Cloning shares the log.
#[derive(Clone, Default)]
pub struct EventStream {
    inner: Arc<StreamInner>,
}

impl EventStream {
    /// Append an event and wake blocked subscribers.
    pub fn push(&self, event: Event) {
        let mut events = self.inner.events.lock();
        events.push(Arc::new(event));
        self.inner.cond.notify_all();
    }

    /// Number of events appended so far.
    pub fn len(&self) -> usize {
        self.inner.events.lock().len()
    }

    /// True before the first push.
    pub fn is_empty(&self) -> bool {
        self.inner.events.lock().is_empty()
    }

    /// Register a subscriber. The subscription observes every event pushed
    /// after this call; events are never dropped.
    pub fn subscribe(&self) -> Subscription {
        let cursor = self.inner.events.lock().len();
        Subscription {
            inner: Arc::clone(&self.inner),
            cursor,
        }
    }
}

/// A subscriber's cursor into the event log.
pub struct Subscription {
    inner: Arc<StreamInner>,
    cursor: usize,
}

impl Subscription {
    /// Block until the next event is available and return it.
    pub fn next(&mut self) -> Arc<Event> {
        let mut events = self.inner.events.lock();
        while events.len() <= self.cursor {
            self.inner.cond.wait(&mut events);
        }
        let event = Arc::clone(&events[self.cursor]);
        self.cursor += 1;
        event
    }

    /// Return the next event if one is already available.
    pub fn try_next(&mut self) -> Option<Arc<Event>> {
        let events = self.inner.events.lock();
        let event = events.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(event)
    }
}
