//! # ClientSupervisor: background liveness probe and recovery.
//!
//! Reconnecting blocks for as long as the broker stays away, so it has to run on its own
//! task. [`ClientSupervisor`] is that task: it moves the client behind a
//! `tokio::sync::Mutex`, probes [`Liveness`] at `RuntimeConfig::probe_interval`, and calls
//! [`StreamClient::reconnect`] whenever recovery is needed.
//!
//! ```text
//! every probe_interval:
//!   liveness.needs_recovery()?  no ─► keep probing
//!   lock client
//!     Disposed                  ─► stop
//!     publish Disconnected
//!     reconnect(token)
//!       Ok(_)                   ─► keep probing
//!       Err(Canceled)           ─► stop
//!       Err(e)                  ─► stop with e (e.g. RetriesExhausted)
//! ```
//!
//! Callers use the client through [`ClientSupervisor::client`]; every call they make is
//! serialized with recovery by the mutex. A [`StreamClient::consume_until`] session returns
//! as soon as its consumer is closed by a connection loss, so it never holds off recovery.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::client::StreamClient;
use crate::core::state::{ConnectionState, Liveness};
use crate::error::ClientError;

/// Owns a [`StreamClient`] and keeps it connected.
pub struct ClientSupervisor {
    client: Arc<Mutex<StreamClient>>,
    liveness: Liveness,
    token: CancellationToken,
    task: JoinHandle<Result<(), ClientError>>,
}

impl ClientSupervisor {
    /// Moves `client` onto a background supervision task. Must run inside a tokio runtime.
    ///
    /// The client does not need to be connected yet: a client that never connected is
    /// treated like one that lost its connection.
    pub fn spawn(client: StreamClient) -> Self {
        let liveness = client.liveness();
        let probe = client.runtime().probe_interval_clamped();
        let client = Arc::new(Mutex::new(client));
        let token = CancellationToken::new();

        let task = tokio::spawn(supervise(
            Arc::clone(&client),
            liveness.clone(),
            probe,
            token.clone(),
        ));
        Self {
            client,
            liveness,
            token,
            task,
        }
    }

    /// Shared handle to the supervised client.
    pub fn client(&self) -> Arc<Mutex<StreamClient>> {
        Arc::clone(&self.client)
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Whether the supervision task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops supervision and disposes the client.
    ///
    /// Returns the error the supervision task stopped with, if any, otherwise the outcome
    /// of disposing. A client that was already disposed is not an error here.
    pub async fn shutdown(self) -> Result<(), ClientError> {
        self.token.cancel();
        let supervised = match self.task.await {
            Ok(outcome) => outcome,
            Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Err(_) => Ok(()),
        };

        let disposed = match self.client.lock().await.dispose().await {
            Err(ClientError::AlreadyClosed) => Ok(()),
            other => other,
        };
        supervised.and(disposed)
    }
}

async fn supervise(
    client: Arc<Mutex<StreamClient>>,
    liveness: Liveness,
    probe: Duration,
    token: CancellationToken,
) -> Result<(), ClientError> {
    let mut ticker = tokio::time::interval(probe);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        if !liveness.needs_recovery() {
            continue;
        }

        let mut client = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            guard = client.lock() => guard,
        };
        if client.state() == ConnectionState::Disposed {
            return Ok(());
        }
        // Someone may have reconnected while we waited for the lock.
        if !liveness.needs_recovery() {
            continue;
        }

        client.report_disconnected();
        match client.reconnect(&token).await {
            Ok(_) => {}
            Err(ClientError::Canceled) => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}
