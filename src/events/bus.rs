//! # Event bus for client events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that the client, consumer close observers
//! and the connection supervisor can report what they do without knowing who listens.
//!
//! ## Architecture
//! ```text
//! Publishers:                           Listener:
//!   StreamClient       ──┐
//!   consumer observers ──┼──────► Bus ───────► subscriber listener ────► SubscriberSet
//!   ClientSupervisor   ──┘  (broadcast chan)    (spawned by the builder)
//! ```
//!
//! The builder spawns a single listener that fans events out to the injected
//! subscribers via [`SubscriberSet`](crate::SubscriberSet). Tests may call
//! [`Bus::subscribe`] directly and assert on the received sequence.
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - Capacity is one shared ring buffer; lagging receivers get `RecvError::Lagged(n)`.
//! - Nothing is persisted.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for client events.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding at most `capacity` undelivered events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Returns a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_receiver_sees_only_later_events() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::Connecting));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::Connected));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Connected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_receivers_is_silent() {
        let bus = Bus::new(0);
        assert_eq!(bus.receiver_count(), 0);
        bus.publish(Event::new(EventKind::Disposed));
    }
}
