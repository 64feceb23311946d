//! # Broker topology provisioning.
//!
//! Provisioning is a fixed plan of [`Step`]s executed in order by the client:
//!
//! ```text
//! plan(stream, cfg) = [ Stream ] ++ [ Exchange; cfg.exchanges ] ++ [ Binding; cfg.bindings ]
//!
//! Stream   ──► Environment::declare_stream          (long-lived stream session)
//! Exchange ──► connect → channel → exchange_declare → close → close
//! Binding  ──► connect → channel → queue_bind       → close → close
//! ```
//!
//! The first failing step stops the plan. Earlier steps are not rolled back; declaring
//! the same entity again is idempotent, so the next connect simply repeats them.

mod binding;
mod exchange;
mod stream;

pub use stream::StreamProvisioner;

use std::fmt;

use crate::broker::{ControlChannel, ControlConnection, ControlPlane, Environment};
use crate::config::{BindingConfig, ClientConfig, ControlAddress, ExchangeConfig};
use crate::error::BrokerError;

/// One provisioning step.
#[derive(Clone, Copy)]
pub(crate) enum Step<'a> {
    Stream(&'a StreamProvisioner),
    Exchange(&'a ExchangeConfig),
    Binding(&'a BindingConfig),
}

impl Step<'_> {
    /// Declares the entity this step stands for.
    pub(crate) async fn apply(
        self,
        env: &dyn Environment,
        control: &dyn ControlPlane,
        addr: &ControlAddress,
    ) -> Result<(), BrokerError> {
        match self {
            Step::Stream(stream) => stream.declare(env).await,
            Step::Exchange(cfg) => exchange::declare(control, addr, cfg).await,
            Step::Binding(cfg) => binding::declare(control, addr, cfg).await,
        }
    }
}

impl fmt::Display for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Stream(stream) => write!(f, "stream '{}'", stream.name()),
            Step::Exchange(cfg) => write!(f, "exchange '{}' ({})", cfg.name, cfg.kind),
            Step::Binding(cfg) => write!(
                f,
                "binding '{}' -> '{}' ({})",
                cfg.exchange, cfg.queue, cfg.routing_key
            ),
        }
    }
}

/// Builds the provisioning plan: stream, then exchanges, then bindings.
pub(crate) fn plan<'a>(stream: &'a StreamProvisioner, cfg: &'a ClientConfig) -> Vec<Step<'a>> {
    std::iter::once(Step::Stream(stream))
        .chain(cfg.exchanges.iter().map(Step::Exchange))
        .chain(cfg.bindings.iter().map(Step::Binding))
        .collect()
}

/// A short-lived control connection with one open channel.
pub(crate) struct ControlSession {
    conn: Box<dyn ControlConnection>,
    channel: Box<dyn ControlChannel>,
}

impl ControlSession {
    pub(crate) async fn open(
        control: &dyn ControlPlane,
        addr: &ControlAddress,
    ) -> Result<Self, BrokerError> {
        let conn = control.connect(addr).await?;
        match conn.channel().await {
            Ok(channel) => Ok(Self { conn, channel }),
            Err(err) => {
                let _ = conn.close().await;
                Err(err)
            }
        }
    }

    pub(crate) fn channel(&self) -> &dyn ControlChannel {
        self.channel.as_ref()
    }

    /// Closes channel and connection; `outcome` wins over close errors.
    pub(crate) async fn finish(self, outcome: Result<(), BrokerError>) -> Result<(), BrokerError> {
        let channel = self.channel.close().await;
        let conn = self.conn.close().await;
        outcome.and(channel).and(conn)
    }
}
