//! Client core: connection lifecycle and supervision.
//!
//! - [`client`]: `StreamClient`, connect/provision, reconnect state machine, teardown;
//! - [`builder`]: wires the event bus and subscriber workers;
//! - [`state`]: `ConnectionState`, the shared environment slot and `Liveness`;
//! - [`supervisor`]: background probe that drives `reconnect`;
//! - [`config`]: runtime knobs (bus capacity, reconnect policy, probe interval).

mod builder;
mod client;
mod config;
mod state;
mod supervisor;

pub use builder::StreamClientBuilder;
pub use client::{SessionEnd, StreamClient};
pub use config::{MIN_PROBE_INTERVAL, RuntimeConfig};
pub use state::{ConnectionState, HealthReport, HealthStatus, Liveness};
pub use supervisor::ClientSupervisor;
