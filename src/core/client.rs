//! # StreamClient: connection and topology lifecycle.
//!
//! [`StreamClient`] owns one stream-protocol environment, the stream provisioner with its
//! consumers, and the exchange/binding descriptors. Every mutating operation takes
//! `&mut self`; the only concurrent actors are the broker's delivery tasks, the consumer
//! close observers and (optionally) a [`ClientSupervisor`](crate::ClientSupervisor).
//!
//! ## Connect
//! ```text
//! connect()
//!   ├─► validate config
//!   ├─► release a previous environment (close if still open)
//!   ├─► StreamProtocol::open(environment_options)
//!   └─► plan: stream ─► exchange[0..n] ─► binding[0..m]      (first failure stops)
//!          each step publishes Declared / DeclareFailed
//! ```
//!
//! ## Reconnect state machine
//! ```text
//! attempt = 1
//! loop:
//!   policy.allows(attempt)?  no ─► Disconnected, ReconnectExhausted, Err(RetriesExhausted)
//!   Retrying{attempt}, ReconnectScheduled(delay)
//!   select { token.cancelled() ─► Disconnected, Err(Canceled) ; sleep(delay) }
//!   teardown + connect
//!     ok  ─► Connected, Reconnected, Ok(attempt - 1)
//!     err ─► ReconnectFailed, attempt += 1
//! ```
//!
//! ## Teardown
//! Close consumers ─► delete stream ─► close environment. The step reached is remembered,
//! so a retry resumes at the step that failed. An environment that already reports itself
//! closed (connection lost) has nothing left to release and is simply dropped.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::broker::{
    Consumer, ConsumerClosed, ControlPlane, Environment, MessageHandler, StreamProtocol,
};
use crate::config::ClientConfig;
use crate::core::builder::StreamClientBuilder;
use crate::core::config::RuntimeConfig;
use crate::core::state::{ConnectionState, HealthReport, Link, Liveness};
use crate::error::{BrokerError, ClientError};
use crate::events::{Bus, Event, EventKind};
use crate::topology::{self, StreamProvisioner};

/// Next teardown step to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TeardownStep {
    Consumers,
    Stream,
    Environment,
}

impl TeardownStep {
    fn as_str(self) -> &'static str {
        match self {
            TeardownStep::Consumers => "consumers",
            TeardownStep::Stream => "stream",
            TeardownStep::Environment => "environment",
        }
    }
}

/// How a [`StreamClient::consume_until`] session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The token was cancelled; the session's consumer is closed.
    Canceled,
    /// The consumer was closed underneath the session.
    Closed(ConsumerClosed),
}

/// Connection lifecycle manager for one stream and its topology.
///
/// Build it with [`StreamClient::builder`].
pub struct StreamClient {
    config: ClientConfig,
    runtime: RuntimeConfig,
    control: Arc<dyn ControlPlane>,
    protocol: Arc<dyn StreamProtocol>,
    stream: StreamProvisioner,
    link: Link,
    teardown: TeardownStep,
    bus: Bus,
    _listener: Option<DropGuard>,
}

impl StreamClient {
    /// Starts building a client for `config` on top of `broker`.
    pub fn builder<B>(config: ClientConfig, broker: Arc<B>) -> StreamClientBuilder
    where
        B: ControlPlane + StreamProtocol,
    {
        StreamClientBuilder::new(config, broker)
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        runtime: RuntimeConfig,
        control: Arc<dyn ControlPlane>,
        protocol: Arc<dyn StreamProtocol>,
        bus: Bus,
        listener: Option<DropGuard>,
    ) -> Self {
        let stream = StreamProvisioner::new(config.stream.clone());
        Self {
            config,
            runtime,
            control,
            protocol,
            stream,
            link: Link::new(),
            teardown: TeardownStep::Consumers,
            bus,
            _listener: listener,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Whether the environment exists and reports itself open. No side effects.
    pub fn is_connected(&self) -> bool {
        self.link
            .environment()
            .is_some_and(|env| !env.is_closed())
    }

    /// Cloneable liveness view, usable while another task holds the client.
    pub fn liveness(&self) -> Liveness {
        self.link.liveness()
    }

    pub fn check_health(&self) -> HealthReport {
        HealthReport::from_connected(self.is_connected())
    }

    /// Receiver for events published from now on.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Consumer handles currently tracked, in creation order.
    pub fn consumers(&self) -> &[Arc<dyn Consumer>] {
        self.stream.consumers()
    }

    /// Opens a fresh environment and provisions stream, exchanges and bindings.
    ///
    /// Errors are returned as-is and never retried here. Entities declared before a
    /// failing step stay on the broker.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        self.ensure_usable()?;
        self.link.set_state(ConnectionState::Connecting);
        self.bus.publish(self.event(EventKind::Connecting));

        match self.establish().await {
            Ok(()) => {
                self.link.set_state(ConnectionState::Connected);
                self.bus.publish(self.event(EventKind::Connected));
                Ok(())
            }
            Err(err) => {
                self.link.set_state(ConnectionState::Disconnected);
                self.bus
                    .publish(self.event(EventKind::ConnectFailed).with_reason(err.to_string()));
                Err(err)
            }
        }
    }

    /// Tears down and reconnects until an iteration succeeds.
    ///
    /// Returns the number of failed iterations. With the default policy and a token that
    /// is never cancelled this only returns once connected.
    ///
    /// # Errors
    /// - [`ClientError::Canceled`] when `token` is cancelled during a backoff sleep
    /// - [`ClientError::RetriesExhausted`] when the policy's attempt limit is reached
    /// - [`ClientError::AlreadyClosed`] after [`dispose`](Self::dispose)
    pub async fn reconnect(&mut self, token: &CancellationToken) -> Result<u32, ClientError> {
        self.ensure_usable()?;
        let policy = self.runtime.reconnect;
        let mut last: Option<ClientError> = None;
        let mut attempt: u32 = 1;

        loop {
            if !policy.allows(attempt) {
                let failed = attempt - 1;
                let last = last.unwrap_or(ClientError::NotConnected);
                self.link.set_state(ConnectionState::Disconnected);
                self.bus.publish(
                    self.event(EventKind::ReconnectExhausted)
                        .with_attempt(failed)
                        .with_reason(last.to_string()),
                );
                return Err(ClientError::RetriesExhausted {
                    attempts: failed,
                    last: Box::new(last),
                });
            }

            let delay = policy.delay_before(attempt);
            self.link.set_state(ConnectionState::Retrying { attempt });
            self.bus.publish(
                self.event(EventKind::ReconnectScheduled)
                    .with_attempt(attempt)
                    .with_delay(delay),
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.link.set_state(ConnectionState::Disconnected);
                    self.bus.publish(self.event(EventKind::ReconnectCanceled).with_attempt(attempt));
                    return Err(ClientError::Canceled);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            self.bus
                .publish(self.event(EventKind::ReconnectAttempt).with_attempt(attempt));
            match self.recover().await {
                Ok(()) => {
                    self.link.set_state(ConnectionState::Connected);
                    self.bus
                        .publish(self.event(EventKind::Reconnected).with_attempt(attempt));
                    return Ok(attempt - 1);
                }
                Err(err) => {
                    self.bus.publish(
                        self.event(EventKind::ReconnectFailed)
                            .with_attempt(attempt)
                            .with_reason(err.to_string()),
                    );
                    last = Some(err);
                }
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// Attaches a new consumer to the stream, starting at the first retained message.
    ///
    /// Returns as soon as the broker accepts it; `handler` runs on the broker's delivery
    /// task for every message.
    pub async fn consume(
        &mut self,
        handler: MessageHandler,
    ) -> Result<Arc<dyn Consumer>, ClientError> {
        self.ensure_usable()?;
        let env = self
            .link
            .environment()
            .filter(|env| !env.is_closed())
            .ok_or(ClientError::NotConnected)?;
        Ok(self.stream.consume(env.as_ref(), handler, &self.bus).await?)
    }

    /// Runs one consumption session: attaches a consumer and waits for `token` or for the
    /// consumer's close, whichever comes first.
    ///
    /// On cancellation only the session's own consumer is closed. When the broker closes
    /// it (connection lost) the session returns [`SessionEnd::Closed`] so the caller can
    /// release the client, let recovery run and start a new session.
    pub async fn consume_until(
        &mut self,
        handler: MessageHandler,
        token: &CancellationToken,
    ) -> Result<SessionEnd, ClientError> {
        let consumer = self.consume(handler).await?;
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.stream.close_consumer(&consumer).await?;
                Ok(SessionEnd::Canceled)
            }
            closed = consumer.closed() => {
                self.stream.untrack(&consumer);
                Ok(SessionEnd::Closed(closed))
            }
        }
    }

    /// Closes tracked consumers in creation order; the first failure stops and is returned.
    pub async fn close_consumers(&mut self) -> Result<(), ClientError> {
        self.ensure_usable()?;
        Ok(self.stream.close_consumers().await?)
    }

    /// Full teardown; the client is unusable afterwards.
    ///
    /// A failed teardown leaves the client usable so `dispose` can be retried; it resumes
    /// at the step that failed. Disposing twice fails with [`ClientError::AlreadyClosed`].
    pub async fn dispose(&mut self) -> Result<(), ClientError> {
        self.ensure_usable()?;
        self.bus.publish(self.event(EventKind::Disposing));
        self.teardown().await?;
        self.link.set_state(ConnectionState::Disposed);
        self.bus.publish(self.event(EventKind::Disposed));
        Ok(())
    }

    /// Publishes `Disconnected` on behalf of a liveness probe.
    pub(crate) fn report_disconnected(&self) {
        self.bus.publish(self.event(EventKind::Disconnected));
    }

    fn ensure_usable(&self) -> Result<(), ClientError> {
        if self.link.state() == ConnectionState::Disposed {
            return Err(ClientError::AlreadyClosed);
        }
        Ok(())
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_host(self.config.host.as_str())
            .with_stream(self.stream.name())
    }

    async fn recover(&mut self) -> Result<(), ClientError> {
        self.teardown().await?;
        self.establish().await
    }

    async fn establish(&mut self) -> Result<(), ClientError> {
        self.config.validate()?;
        self.release_previous().await?;

        let env = self
            .protocol
            .open(&self.config.environment_options())
            .await?;
        self.link.set_environment(Some(Arc::clone(&env)));
        self.teardown = TeardownStep::Consumers;

        self.provision(env.as_ref()).await?;
        Ok(())
    }

    /// Closes an environment left over from a previous connect.
    async fn release_previous(&mut self) -> Result<(), ClientError> {
        let Some(env) = self.link.environment() else {
            return Ok(());
        };
        if !env.is_closed() {
            env.close().await?;
        }
        self.stream.forget_consumers();
        self.link.set_environment(None);
        Ok(())
    }

    async fn provision(&self, env: &dyn Environment) -> Result<(), BrokerError> {
        let addr = self.config.control_address();
        for step in topology::plan(&self.stream, &self.config) {
            let subject = step.to_string();
            match step.apply(env, self.control.as_ref(), &addr).await {
                Ok(()) => {
                    self.bus
                        .publish(self.event(EventKind::Declared).with_subject(subject));
                }
                Err(err) => {
                    self.bus.publish(
                        self.event(EventKind::DeclareFailed)
                            .with_subject(subject)
                            .with_reason(err.to_string()),
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), ClientError> {
        let Some(env) = self.link.environment() else {
            self.stream.forget_consumers();
            return Ok(());
        };
        if env.is_closed() {
            self.stream.forget_consumers();
            self.link.set_environment(None);
            self.teardown = TeardownStep::Consumers;
            return Ok(());
        }

        if self.teardown == TeardownStep::Consumers {
            let closed = self.stream.close_consumers().await;
            closed.map_err(|err| self.teardown_failed(TeardownStep::Consumers, err))?;
            self.teardown = TeardownStep::Stream;
        }
        if self.teardown == TeardownStep::Stream {
            match self.stream.delete(env.as_ref()).await {
                // Never declared (connect failed early) or already gone.
                Ok(()) | Err(BrokerError::NotFound { .. }) => {}
                Err(err) => return Err(self.teardown_failed(TeardownStep::Stream, err)),
            }
            self.teardown = TeardownStep::Environment;
        }
        env.close()
            .await
            .map_err(|err| self.teardown_failed(TeardownStep::Environment, err))?;

        self.link.set_environment(None);
        self.teardown = TeardownStep::Consumers;
        Ok(())
    }

    fn teardown_failed(&self, step: TeardownStep, err: BrokerError) -> ClientError {
        self.bus.publish(
            self.event(EventKind::TeardownFailed)
                .with_subject(step.as_str())
                .with_reason(err.to_string()),
        );
        err.into()
    }
}
