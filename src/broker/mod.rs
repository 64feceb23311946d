//! # Broker capabilities consumed by the client.
//!
//! The client talks to the broker through two capability surfaces:
//!
//! - **Control plane** ([`ControlPlane`] → [`ControlConnection`] → [`ControlChannel`]):
//!   short-lived AMQP 0-9-1 sessions used to declare exchanges and bindings.
//! - **Stream protocol** ([`StreamProtocol`] → [`Environment`] → [`Consumer`]):
//!   a long-lived session used to declare/delete streams and attach consumers.
//!
//! ```text
//! StreamClient ──► ControlPlane::connect(addr) ──► channel() ──► exchange_declare / queue_bind
//!      │                                                  └──► close(), close()
//!      └─────────► StreamProtocol::open(opts) ──► Environment
//!                                                   ├─► declare_stream / delete_stream
//!                                                   ├─► consumer(stream, opts, handler) ──► Consumer
//!                                                   └─► close()
//! ```
//!
//! Implementations map their failures onto [`BrokerError`]; the client passes those
//! through unchanged. [`memory::MemoryBroker`] implements both surfaces in-process.

pub mod memory;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{
    BindingConfig, ByteCapacity, ControlAddress, EnvironmentOptions, ExchangeConfig, StreamConfig,
};
use crate::error::BrokerError;

/// Callback invoked once per delivered message, from the broker client's delivery task.
///
/// Must be safe to call repeatedly and concurrently with the client's other operations.
pub type MessageHandler = Arc<dyn Fn(ConsumerContext, Message) + Send + Sync>;

/// A message delivered from a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Position of the message in the stream.
    pub offset: u64,
    /// AMQP data sections.
    pub data: Vec<Bytes>,
}

/// Delivery context passed alongside each [`Message`].
#[derive(Clone, Debug)]
pub struct ConsumerContext {
    /// Consumer name.
    pub consumer: Arc<str>,
    /// Stream the message came from.
    pub stream: Arc<str>,
}

/// Where a new consumer starts reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetSpec {
    /// Oldest retained message.
    First,
    /// Last chunk.
    Last,
    /// Only messages published after attaching.
    Next,
    /// Absolute offset.
    Offset(u64),
    /// First message at or after the timestamp.
    Timestamp(SystemTime),
}

/// Options for creating a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub name: String,
    pub offset: OffsetSpec,
    /// Verify chunk CRCs on delivery.
    pub crc_check: bool,
}

/// Retention policy sent with a stream declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamRetention {
    pub max_age: Option<Duration>,
    pub max_length_bytes: Option<ByteCapacity>,
    pub max_segment_size_bytes: Option<ByteCapacity>,
}

impl From<&StreamConfig> for StreamRetention {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            max_age: cfg.age_limit(),
            max_length_bytes: cfg.max_length_bytes,
            max_segment_size_bytes: cfg.max_segment_size_bytes,
        }
    }
}

/// Close notification of a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerClosed {
    pub name: String,
    pub stream: String,
    pub reason: String,
}

impl fmt::Display for ConsumerClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "consumer {} closed on stream {}: {}",
            self.name, self.stream, self.reason
        )
    }
}

/// Opens control-plane connections.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Dials the control plane at `addr`.
    async fn connect(&self, addr: &ControlAddress) -> Result<Box<dyn ControlConnection>, BrokerError>;
}

/// An open control-plane connection.
#[async_trait]
pub trait ControlConnection: Send + Sync {
    /// Opens a channel on this connection.
    async fn channel(&self) -> Result<Box<dyn ControlChannel>, BrokerError>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// A control-plane channel.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Declares an exchange. Re-declaring with identical parameters succeeds.
    async fn exchange_declare(&self, exchange: &ExchangeConfig) -> Result<(), BrokerError>;

    /// Binds `binding.queue` to `binding.exchange` with `binding.routing_key`.
    async fn queue_bind(&self, binding: &BindingConfig) -> Result<(), BrokerError>;

    /// Closes the channel.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Opens stream-protocol environments.
#[async_trait]
pub trait StreamProtocol: Send + Sync + 'static {
    /// Opens a new environment with the given options.
    async fn open(&self, opts: &EnvironmentOptions) -> Result<Arc<dyn Environment>, BrokerError>;
}

/// A stream-protocol session.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Whether the session is closed (explicitly or by connection loss).
    fn is_closed(&self) -> bool;

    /// Declares a stream. Re-declaring with identical retention succeeds.
    async fn declare_stream(&self, name: &str, retention: &StreamRetention)
    -> Result<(), BrokerError>;

    /// Deletes a stream and its retained messages.
    async fn delete_stream(&self, name: &str) -> Result<(), BrokerError>;

    /// Attaches a consumer; `handler` is invoked for every delivered message.
    async fn consumer(
        &self,
        stream: &str,
        opts: ConsumerOptions,
        handler: MessageHandler,
    ) -> Result<Arc<dyn Consumer>, BrokerError>;

    /// Closes the session and every consumer attached to it.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// A live subscription on a stream.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn name(&self) -> &str;

    fn stream(&self) -> &str;

    fn is_closed(&self) -> bool;

    /// Closes the subscription. Closing twice fails with [`BrokerError::AlreadyClosed`].
    async fn close(&self) -> Result<(), BrokerError>;

    /// Completes once the consumer is closed, for any reason.
    async fn closed(&self) -> ConsumerClosed;
}
