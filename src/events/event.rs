//! # Events emitted by the stream client.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Connection events**: connect attempts, provisioning steps, outcome
//! - **Reconnect events**: the reconnect state machine (scheduled, attempt, failed, recovered)
//! - **Consumer events**: consumers started and closed
//! - **Subscriber events**: delivery problems inside the subscriber set
//!
//! The [`Event`] struct carries additional metadata such as timestamps, stream name,
//! subject (entity, consumer or subscriber name), reasons, and backoff delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use amqpstream::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ReconnectFailed)
//!     .with_stream("events")
//!     .with_reason("connection refused")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(2));
//!
//! assert_eq!(ev.kind, EventKind::ReconnectFailed);
//! assert_eq!(ev.stream.as_deref(), Some("events"));
//! assert_eq!(ev.delay_ms, Some(2000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of client events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subject`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subject`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Connection events ===
    /// A connect attempt started.
    ///
    /// Sets:
    /// - `host`: broker host
    /// - `stream`: stream name
    Connecting,

    /// One topology entity was declared.
    ///
    /// Sets:
    /// - `stream`: stream name
    /// - `subject`: entity, e.g. `exchange 'ex1'`
    Declared,

    /// A topology declaration failed; the remaining steps are skipped.
    ///
    /// Sets:
    /// - `stream`: stream name
    /// - `subject`: entity
    /// - `reason`: broker error
    DeclareFailed,

    /// Environment open and topology fully provisioned.
    ///
    /// Sets:
    /// - `host`, `stream`
    Connected,

    /// Connect attempt failed.
    ///
    /// Sets:
    /// - `host`, `stream`
    /// - `reason`: error message
    ConnectFailed,

    /// Liveness probe found the environment closed.
    ///
    /// Sets:
    /// - `host`, `stream`
    Disconnected,

    // === Reconnect events ===
    /// Next reconnect iteration scheduled.
    ///
    /// Sets:
    /// - `attempt`: iteration number (1-based)
    /// - `delay_ms`: sleep before the iteration
    ReconnectScheduled,

    /// Reconnect iteration started (after its sleep).
    ///
    /// Sets:
    /// - `host`, `stream`
    /// - `attempt`: iteration number
    ReconnectAttempt,

    /// Reconnect iteration failed in teardown or connect.
    ///
    /// Sets:
    /// - `attempt`: iteration number
    /// - `reason`: error message
    ReconnectFailed,

    /// Reconnect succeeded.
    ///
    /// Sets:
    /// - `host`, `stream`
    /// - `attempt`: successful iteration number
    Reconnected,

    /// Reconnect policy ran out of attempts.
    ///
    /// Sets:
    /// - `attempt`: failed iterations
    /// - `reason`: last error
    ReconnectExhausted,

    /// Reconnect stopped by its cancellation token.
    ///
    /// Sets:
    /// - `attempt`: iterations started
    ReconnectCanceled,

    // === Teardown events ===
    /// A teardown step failed.
    ///
    /// Sets:
    /// - `stream`: stream name
    /// - `subject`: step (`consumers`, `stream`, `environment`)
    /// - `reason`: error message
    TeardownFailed,

    /// Dispose requested.
    ///
    /// Sets:
    /// - `host`, `stream`
    Disposing,

    /// Dispose finished; the client is closed.
    ///
    /// Sets:
    /// - `host`, `stream`
    Disposed,

    // === Consumer events ===
    /// A consumer was attached to the stream.
    ///
    /// Sets:
    /// - `stream`: stream name
    /// - `subject`: consumer name
    ConsumerStarted,

    /// A consumer closed (by the client, by teardown, or by the broker).
    ///
    /// Sets:
    /// - `stream`: stream name
    /// - `subject`: consumer name
    /// - `reason`: close reason
    ConsumerClosed,
}

/// Client event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Broker host, if applicable.
    pub host: Option<Arc<str>>,
    /// Stream name, if applicable.
    pub stream: Option<Arc<str>>,
    /// Entity, consumer or subscriber the event is about.
    pub subject: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Reconnect iteration (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            host: None,
            stream: None,
            subject: None,
            reason: None,
            attempt: None,
            delay_ms: None,
        }
    }

    /// Attaches the broker host.
    #[inline]
    pub fn with_host(mut self, host: impl Into<Arc<str>>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Attaches the stream name.
    #[inline]
    pub fn with_stream(mut self, stream: impl Into<Arc<str>>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Attaches the subject (entity, consumer or subscriber name).
    #[inline]
    pub fn with_subject(mut self, subject: impl Into<Arc<str>>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a reconnect iteration number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Backoff delay as a `Duration`.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_subject(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_subject(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::Connecting);
        let b = Event::new(EventKind::Connected);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_is_clamped_to_u32_millis() {
        let ev = Event::new(EventKind::ReconnectScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
