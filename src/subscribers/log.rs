//! # LogWriter: events as `tracing` records
//!
//! Maps every [`Event`] to one structured `tracing` record under the `amqpstream` target.
//! Failures go out at `warn`/`error`, lifecycle progress at `info`, per-entity noise at `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO amqpstream: connecting host=localhost stream=events
//! DEBUG amqpstream: declared stream=events entity=exchange 'orders'
//! INFO amqpstream: connected host=localhost stream=events
//! WARN amqpstream: reconnect failed attempt=1 reason=broker unreachable at localhost:5552
//! INFO amqpstream: reconnect scheduled attempt=2 delay_ms=2000
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that forwards events to `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn field(v: &Option<std::sync::Arc<str>>) -> &str {
    v.as_deref().unwrap_or("-")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let host = field(&e.host);
        let stream = field(&e.stream);
        let subject = field(&e.subject);
        let reason = field(&e.reason);

        match e.kind {
            EventKind::Connecting => {
                info!(target: "amqpstream", host, stream, "connecting");
            }
            EventKind::Declared => {
                debug!(target: "amqpstream", stream, entity = subject, "declared");
            }
            EventKind::DeclareFailed => {
                warn!(target: "amqpstream", stream, entity = subject, reason, "declare failed");
            }
            EventKind::Connected => {
                info!(target: "amqpstream", host, stream, "connected");
            }
            EventKind::ConnectFailed => {
                warn!(target: "amqpstream", host, stream, reason, "connect failed");
            }
            EventKind::Disconnected => {
                warn!(target: "amqpstream", host, stream, "environment closed");
            }
            EventKind::ReconnectScheduled => {
                info!(target: "amqpstream", attempt = e.attempt, delay_ms = e.delay_ms, "reconnect scheduled");
            }
            EventKind::ReconnectAttempt => {
                debug!(target: "amqpstream", host, stream, attempt = e.attempt, "reconnect attempt");
            }
            EventKind::ReconnectFailed => {
                warn!(target: "amqpstream", attempt = e.attempt, reason, "reconnect failed");
            }
            EventKind::Reconnected => {
                info!(target: "amqpstream", host, stream, attempt = e.attempt, "reconnected");
            }
            EventKind::ReconnectExhausted => {
                error!(target: "amqpstream", attempts = e.attempt, reason, "reconnect gave up");
            }
            EventKind::ReconnectCanceled => {
                info!(target: "amqpstream", attempt = e.attempt, "reconnect canceled");
            }
            EventKind::TeardownFailed => {
                warn!(target: "amqpstream", stream, step = subject, reason, "teardown step failed");
            }
            EventKind::Disposing => {
                info!(target: "amqpstream", host, stream, "disposing");
            }
            EventKind::Disposed => {
                info!(target: "amqpstream", host, stream, "disposed");
            }
            EventKind::ConsumerStarted => {
                info!(target: "amqpstream", stream, consumer = subject, "consumer started");
            }
            EventKind::ConsumerClosed => {
                info!(target: "amqpstream", stream, consumer = subject, reason, "consumer closed");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "amqpstream", subscriber = subject, reason, "subscriber dropped event");
            }
            EventKind::SubscriberPanicked => {
                error!(target: "amqpstream", subscriber = subject, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
