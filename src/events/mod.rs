//! Client events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the stream client, its consumer
//! close observers, the connection supervisor and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `StreamClient` (connect, provisioning, reconnect, teardown),
//!   consumer close observers, `ClientSupervisor`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by `StreamClientBuilder::build`, which fans out
//!   to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
