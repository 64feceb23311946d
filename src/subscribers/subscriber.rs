//! # Observing the client.
//!
//! [`Subscribe`] is how callers observe the client: logging, metrics, health dashboards
//! and test probes all implement it instead of the client writing to a global logger.
//!
//! The [`SubscriberSet`](crate::SubscriberSet) gives every subscriber its own worker and
//! its own bounded queue ([`Subscribe::queue_capacity`]). A slow subscriber only fills
//! its own queue: overflow drops the event for that subscriber alone and publishes
//! `EventKind::SubscriberOverflow`. A panic inside `on_event` becomes
//! `EventKind::SubscriberPanicked` and the worker moves on to the next event, which
//! arrives in publish order.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use async_trait::async_trait;
//! use amqpstream::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct ReconnectCounter(AtomicU32);
//!
//! #[async_trait]
//! impl Subscribe for ReconnectCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ReconnectFailed {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "reconnect-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of client events.
///
/// `on_event` runs on a tokio worker: keep it non-blocking and handle its own errors.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, from this subscriber's worker task.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    ///
    /// The default is `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity for this subscriber (clamped to at least 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
