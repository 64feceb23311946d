//! # Connection state and liveness.
//!
//! The client publishes its [`ConnectionState`] through a `watch` channel and keeps the
//! active environment in a shared slot, so that a cloned [`Liveness`] handle can answer
//! health probes while another task holds the client itself.
//!
//! ```text
//!                 connect ok
//!  Disconnected ──────────────► Connected ◄─────────────┐
//!     │  ▲                          │                   │ iteration ok
//!     │  └── connect failed ────────┤ env closed        │
//!     │                             ▼                   │
//!     │                    reconnect: Retrying{n} ──────┘
//!     │                             │ canceled / exhausted → Disconnected
//!     └───────── dispose ok ────────┴──────────────────► Disposed (terminal)
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::broker::Environment;

/// Lifecycle state of a [`StreamClient`](crate::StreamClient).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No provisioned environment (initial state, or after a failed connect).
    Disconnected,
    /// `connect` in progress.
    Connecting,
    /// Environment open and topology provisioned.
    Connected,
    /// Reconnect loop running; `attempt` is the current iteration (1-based).
    Retrying { attempt: u32 },
    /// Disposed; terminal.
    Disposed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Retrying { attempt } => write!(f, "retrying (attempt {attempt})"),
            ConnectionState::Disposed => f.write_str("disposed"),
        }
    }
}

/// Outcome of a health check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Error,
}

/// Health check result for host adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: &'static str,
}

impl HealthReport {
    pub(crate) fn from_connected(connected: bool) -> Self {
        if connected {
            Self {
                status: HealthStatus::Ok,
                message: "AMQP Connected",
            }
        } else {
            Self {
                status: HealthStatus::Error,
                message: "AMQP Disconnected",
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

type EnvSlot = Arc<RwLock<Option<Arc<dyn Environment>>>>;

/// Read-only, cloneable view of a client's connection.
#[derive(Clone)]
pub struct Liveness {
    env: EnvSlot,
    state: watch::Receiver<ConnectionState>,
}

impl Liveness {
    /// Whether an environment exists and does not report itself closed.
    pub fn is_connected(&self) -> bool {
        self.env
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|env| !env.is_closed())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn check_health(&self) -> HealthReport {
        HealthReport::from_connected(self.is_connected())
    }

    /// Whether the connection should be re-established.
    ///
    /// True when nobody is connecting and the client is either not provisioned or its
    /// environment was lost.
    pub fn needs_recovery(&self) -> bool {
        match self.state() {
            ConnectionState::Connecting
            | ConnectionState::Retrying { .. }
            | ConnectionState::Disposed => false,
            ConnectionState::Connected => !self.is_connected(),
            ConnectionState::Disconnected => true,
        }
    }

    /// Waits until the state satisfies `pred`, returning that state.
    ///
    /// Returns the last observed state if the client was dropped.
    pub async fn wait_for(&mut self, pred: impl FnMut(&ConnectionState) -> bool) -> ConnectionState {
        if let Ok(state) = self.state.wait_for(pred).await {
            return *state;
        }
        self.state()
    }
}

/// Writer side owned by the client.
pub(crate) struct Link {
    env: EnvSlot,
    state: watch::Sender<ConnectionState>,
}

impl Link {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            env: Arc::new(RwLock::new(None)),
            state,
        }
    }

    pub(crate) fn environment(&self) -> Option<Arc<dyn Environment>> {
        self.env
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_environment(&self, env: Option<Arc<dyn Environment>>) {
        *self.env.write().unwrap_or_else(PoisonError::into_inner) = env;
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        self.state.send_replace(next);
    }

    pub(crate) fn liveness(&self) -> Liveness {
        Liveness {
            env: Arc::clone(&self.env),
            state: self.state.subscribe(),
        }
    }
}
