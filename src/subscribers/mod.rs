//! # Event subscribers.
//!
//! - [`Subscribe`] trait for custom observers
//! - [`SubscriberSet`] non-blocking fan-out with per-subscriber queues
//! - [`LogWriter`] `tracing` output (feature `logging`)
//!
//! ```text
//! StreamClient ──publish──► Bus ──► listener ──► SubscriberSet::emit
//!                                                   ├─► queue ─► LogWriter
//!                                                   └─► queue ─► custom subscriber
//! ```

mod set;
mod subscriber;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
