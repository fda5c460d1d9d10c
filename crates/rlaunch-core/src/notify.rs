//! Typed notification channels.
//!
//! Each notification kind has its own channel with a fixed payload type.
//! Delivery is synchronous and follows registration order.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Channel<E> {
    next_id: u64,
    observers: Vec<(SubscriptionId, Box<dyn FnMut(&E)>)>,
}

impl<E> Channel<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&E) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn emit(&mut self, event: &E) {
        for (_, observer) in self.observers.iter_mut() {
            observer(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }
}

impl<E> Default for Channel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Channel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("subscribers", &self.observers.len())
            .finish()
    }
}

/// The local roster was created or reconciled against a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterChanged;

/// A process was found running at attach time, or a start was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStarted {
    pub name: String,
}

/// A stop was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStopped {
    pub name: String,
}

/// A visible control was clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlClicked {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct RosterNotifications {
    pub roster_changed: Channel<RosterChanged>,
    pub process_started: Channel<ProcessStarted>,
    pub process_stopped: Channel<ProcessStopped>,
}
