//! Client configuration.
//!
//! Provides [`ClientConfig`], the immutable-after-load description of a broker connection
//! and the topology the client provisions on it.
//!
//! ## Contents
//! - [`ClientConfig`] connection parameters plus nested topology configuration
//! - [`StreamConfig`], [`ExchangeConfig`], [`BindingConfig`] topology descriptors
//! - [`ByteCapacity`] retention sizes (`1048576` or `"1MB"`)
//! - [`ControlAddress`], [`EnvironmentOptions`] values handed to the broker capabilities
//!
//! ## Sentinel values
//! - `requested_heartbeat = 0s` → heartbeats disabled
//! - `stream.max_age = 0s` → no age-based retention
//!
//! Configuration is usually decoded from a settings document with
//! [`ClientConfig::from_settings`]; see [`settings`](self::settings) for the format.

mod client;
pub(crate) mod settings;
mod topology;

pub use client::{ClientConfig, ControlAddress, EnvironmentOptions};
pub use topology::{BindingConfig, ByteCapacity, ExchangeConfig, ExchangeKind, StreamConfig};
