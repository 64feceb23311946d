//! # amqpstream
//!
//! **amqpstream** manages the lifecycle of a client connection to a stream broker with an
//! AMQP 0-9-1 control plane: it opens the stream-protocol environment, provisions the
//! stream, exchanges and bindings, attaches consumers, and recovers from connection loss.
//!
//! The broker itself is a capability boundary ([`broker`] module traits). The crate ships
//! [`broker::memory::MemoryBroker`], an in-process implementation for tests and local
//! development.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ClientConfig (struct or settings JSON)
//!          │
//!          ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  StreamClient (lifecycle manager)                                 │
//! │  - StreamProvisioner (stream + tracked consumers)                 │
//! │  - exchange / binding provisioners (short-lived control sessions) │
//! │  - ConnectionState + Liveness                                     │
//! │  - reconnect state machine (ReconnectPolicy + CancellationToken)  │
//! └──────┬──────────────────────────────┬─────────────────────────────┘
//!        │ ControlPlane / StreamProtocol│ publishes Events
//!        ▼                              ▼
//!   broker (trait objects)     ┌────────────────────────┐
//!                              │ Bus (broadcast channel)│
//!                              └───────────┬────────────┘
//!                                          ▼
//!                                   bus listener
//!                                          ▼
//!                                   SubscriberSet
//!                                ┌─────────┼─────────┐
//!                                ▼         ▼         ▼
//!                             LogWriter  metrics   custom
//! ```
//!
//! ### Lifecycle
//! ```text
//! connect():  open environment ─► stream ─► exchanges ─► bindings   (first failure stops)
//! consume():  attach consumer (offset First, no CRC) ─► handle returned immediately
//!                                         └─► close observer ─► ConsumerClosed event
//! consume_until(token): consume ─► wait for token or consumer close ─► SessionEnd
//! reconnect(token):
//!   loop {
//!     ├─► policy.allows(attempt)?           no ─► Err(RetriesExhausted)
//!     ├─► sleep(policy.delay_before(attempt))   (cancellable ─► Err(Canceled))
//!     ├─► teardown: consumers ─► stream ─► environment
//!     └─► connect()  ok ─► Ok(failed iterations) / err ─► ReconnectFailed, next attempt
//!   }
//! dispose():  teardown ─► Disposed (terminal)
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------|---------------------------------------------|
//! | **Lifecycle**     | Connect, provision, consume, teardown, dispose.           | [`StreamClient`]                            |
//! | **Recovery**      | Reconnect state machine and background supervision.       | [`ReconnectPolicy`], [`ClientSupervisor`]   |
//! | **Observability** | Events delivered to injected subscribers.                 | [`Subscribe`], [`Event`], [`EventKind`]     |
//! | **Configuration** | Broker, topology and runtime settings.                    | [`ClientConfig`], [`RuntimeConfig`]         |
//! | **Errors**        | Broker errors passed through, plus client errors.         | [`BrokerError`], [`ClientError`]            |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a subscriber that emits `tracing` records.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use amqpstream::broker::memory::MemoryBroker;
//! use amqpstream::broker::{ConsumerContext, Message};
//! use amqpstream::{
//!     BindingConfig, ClientConfig, ExchangeConfig, ExchangeKind, StreamClient, StreamConfig,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = ClientConfig::new(StreamConfig::new("events"))
//!         .with_exchange(ExchangeConfig::new("ex1", ExchangeKind::Topic))
//!         .with_binding(BindingConfig::new("ex1", "events", "orders.*"));
//!
//!     let broker = Arc::new(MemoryBroker::new());
//!     let mut client = StreamClient::builder(cfg, broker.clone()).build();
//!
//!     client.connect().await?;
//!     assert!(client.is_connected());
//!
//!     client
//!         .consume(Arc::new(|ctx: ConsumerContext, msg: Message| {
//!             println!("{} @{}: {} sections", ctx.stream, msg.offset, msg.data.len());
//!         }))
//!         .await?;
//!     broker.publish("events", "hello")?;
//!
//!     client.dispose().await?;
//!     Ok(())
//! }
//! ```

pub mod broker;
mod config;
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod topology;

// ---- Public re-exports ----

pub use config::{
    BindingConfig, ByteCapacity, ClientConfig, ControlAddress, EnvironmentOptions,
    ExchangeConfig, ExchangeKind, StreamConfig,
};
pub use self::core::{
    ClientSupervisor, ConnectionState, HealthReport, HealthStatus, Liveness, MIN_PROBE_INTERVAL,
    RuntimeConfig, SessionEnd, StreamClient, StreamClientBuilder,
};
pub use error::{BrokerError, ClientError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, DEFAULT_RECONNECT_DELAY, JitterPolicy, ReconnectPolicy};
pub use subscribers::{Subscribe, SubscriberSet};
pub use topology::StreamProvisioner;

// Optional: built-in subscriber that forwards events to `tracing`.
// Enabled by default through the `logging` feature.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
