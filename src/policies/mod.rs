//! Reconnect policies.
//!
//! This module groups the knobs that control **whether** the reconnect loop tries again
//! and **how long** it waits between iterations.
//!
//! ## Contents
//! - [`ReconnectPolicy`] attempt limit plus backoff
//! - [`BackoffPolicy`] how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! RuntimeConfig { reconnect: ReconnectPolicy, .. }
//!      └─► StreamClient::reconnect uses:
//!           - reconnect.allows(attempt) to decide continue/give up
//!           - reconnect.delay_before(attempt) to sleep before each iteration
//! ```
//!
//! ## Defaults
//! - `ReconnectPolicy::default()` → unlimited attempts, fixed 2 s backoff.
//! - `JitterPolicy::None`.

mod backoff;
mod jitter;
mod reconnect;

pub use backoff::{BackoffPolicy, DEFAULT_RECONNECT_DELAY};
pub use jitter::JitterPolicy;
pub use reconnect::ReconnectPolicy;
