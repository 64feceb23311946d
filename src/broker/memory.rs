//! # In-process broker.
//!
//! [`MemoryBroker`] implements both [`ControlPlane`] and [`StreamProtocol`] against shared
//! in-memory state. It exists for tests and local development: it records every
//! declaration, delivers published messages to attached consumers, and can be told to
//! fail in specific ways.
//!
//! ## Failure injection
//! - [`MemoryBroker::set_unreachable`] / [`MemoryBroker::fail_next_opens`]: dial failures
//! - [`MemoryBroker::disconnect_all`]: connection loss (environments and consumers close)
//! - [`MemoryBroker::fail_stream_declare`], [`MemoryBroker::fail_exchange_declare`],
//!   [`MemoryBroker::fail_binding`]: declaration failures
//! - [`MemoryBroker::fail_stream_delete`], [`MemoryBroker::fail_consumer_close`]: teardown failures
//!
//! ## Declaration semantics
//! Re-declaring a stream or exchange with identical parameters succeeds; a mismatch
//! fails with [`BrokerError::PreconditionFailed`]. Bindings require both ends to exist.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use amqpstream::broker::memory::MemoryBroker;
//!
//! let broker = Arc::new(MemoryBroker::new());
//! broker.fail_next_opens(2);
//! assert!(!broker.has_stream("events"));
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

use crate::broker::{
    Consumer, ConsumerClosed, ConsumerContext, ConsumerOptions, ControlChannel, ControlConnection,
    ControlPlane, Environment, Message, MessageHandler, OffsetSpec, StreamProtocol,
    StreamRetention,
};
use crate::config::{BindingConfig, ControlAddress, EnvironmentOptions, ExchangeConfig};
use crate::error::BrokerError;

/// One successful declaration, in the order the broker accepted them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Declaration {
    Stream(String),
    Exchange(String),
    Binding {
        exchange: String,
        queue: String,
        routing_key: String,
    },
}

/// Snapshot of a consumer known to the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerInfo {
    /// Creation index (0-based, broker-wide).
    pub id: u64,
    pub name: String,
    pub stream: String,
    pub closed: bool,
}

#[derive(Default)]
struct StreamLog {
    retention: StreamRetention,
    messages: Vec<Message>,
}

#[derive(Default)]
struct Faults {
    unreachable: bool,
    failing_opens: u32,
    stream_declare: HashSet<String>,
    exchange_declare: HashSet<String>,
    binding: HashSet<(String, String)>,
    stream_delete: bool,
    consumer_close: HashSet<u64>,
}

#[derive(Default)]
struct BrokerState {
    faults: Faults,
    opens: u32,
    streams: BTreeMap<String, StreamLog>,
    exchanges: BTreeMap<String, ExchangeConfig>,
    bindings: Vec<BindingConfig>,
    declarations: Vec<Declaration>,
    environments: Vec<Arc<AtomicBool>>,
    consumers: Vec<Arc<MemoryConsumer>>,
    open_control_connections: usize,
}

impl BrokerState {
    fn dial(&mut self, authority: String) -> Result<(), BrokerError> {
        if self.faults.unreachable {
            return Err(BrokerError::Unreachable {
                addr: authority,
                reason: "connection refused".into(),
            });
        }
        if self.faults.failing_opens > 0 {
            self.faults.failing_opens -= 1;
            return Err(BrokerError::Unreachable {
                addr: authority,
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }

    /// Open consumers matching `pred`.
    fn open_consumers_where(
        &self,
        pred: impl Fn(&MemoryConsumer) -> bool,
    ) -> Vec<Arc<MemoryConsumer>> {
        self.consumers
            .iter()
            .filter(|c| {
                let consumer: &MemoryConsumer = c;
                !consumer.is_closed() && pred(consumer)
            })
            .cloned()
            .collect()
    }
}

type Shared = Arc<Mutex<BrokerState>>;

fn lock(state: &Shared) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process broker implementing both control-plane and stream-protocol capabilities.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Shared,
}

impl MemoryBroker {
    /// Creates an empty, reachable broker.
    pub fn new() -> Self {
        Self::default()
    }

    // ---- failure injection ----

    /// Refuses (or accepts again) every new connection.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).faults.unreachable = unreachable;
    }

    /// Refuses the next `n` connection attempts (environment or control plane).
    pub fn fail_next_opens(&self, n: u32) {
        lock(&self.state).faults.failing_opens = n;
    }

    /// Rejects declarations of the named stream.
    pub fn fail_stream_declare(&self, name: &str) {
        lock(&self.state).faults.stream_declare.insert(name.to_string());
    }

    /// Rejects declarations of the named exchange.
    pub fn fail_exchange_declare(&self, name: &str) {
        lock(&self.state)
            .faults
            .exchange_declare
            .insert(name.to_string());
    }

    /// Rejects bindings from `exchange` to `queue`.
    pub fn fail_binding(&self, exchange: &str, queue: &str) {
        lock(&self.state)
            .faults
            .binding
            .insert((exchange.to_string(), queue.to_string()));
    }

    /// Rejects stream deletions.
    pub fn fail_stream_delete(&self, fail: bool) {
        lock(&self.state).faults.stream_delete = fail;
    }

    /// Rejects closing the consumer with the given creation index.
    pub fn fail_consumer_close(&self, id: u64) {
        lock(&self.state).faults.consumer_close.insert(id);
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        lock(&self.state).faults = Faults::default();
    }

    /// Simulates connection loss: every open environment and consumer is closed.
    pub fn disconnect_all(&self) {
        let dropped = {
            let mut state = lock(&self.state);
            for env in state.environments.drain(..) {
                env.store(true, Ordering::SeqCst);
            }
            state.open_consumers_where(|_| true)
        };
        for consumer in dropped {
            consumer.shut("connection lost");
        }
    }

    // ---- traffic ----

    /// Appends a message to `stream` and delivers it to open consumers of that stream.
    ///
    /// Returns the message offset.
    pub fn publish(&self, stream: &str, payload: impl Into<Bytes>) -> Result<u64, BrokerError> {
        let (message, targets) = {
            let mut state = lock(&self.state);
            let log = state
                .streams
                .get_mut(stream)
                .ok_or_else(|| BrokerError::NotFound {
                    entity: "stream",
                    name: stream.to_string(),
                })?;
            let message = Message {
                offset: log.messages.len() as u64,
                data: vec![payload.into()],
            };
            log.messages.push(message.clone());
            let targets = state.open_consumers_where(|c| c.stream == stream);
            (message, targets)
        };

        let offset = message.offset;
        for consumer in targets {
            consumer.deliver(message.clone());
        }
        Ok(offset)
    }

    // ---- inspection ----

    pub fn has_stream(&self, name: &str) -> bool {
        lock(&self.state).streams.contains_key(name)
    }

    pub fn stream_retention(&self, name: &str) -> Option<StreamRetention> {
        lock(&self.state)
            .streams
            .get(name)
            .map(|log| log.retention.clone())
    }

    pub fn exchange(&self, name: &str) -> Option<ExchangeConfig> {
        lock(&self.state).exchanges.get(name).cloned()
    }

    pub fn bindings(&self) -> Vec<BindingConfig> {
        lock(&self.state).bindings.clone()
    }

    /// Every accepted declaration, in order.
    pub fn declarations(&self) -> Vec<Declaration> {
        lock(&self.state).declarations.clone()
    }

    /// Environment open attempts, successful or not.
    pub fn environment_opens(&self) -> u32 {
        lock(&self.state).opens
    }

    /// Environments currently open.
    pub fn open_environments(&self) -> usize {
        lock(&self.state)
            .environments
            .iter()
            .filter(|closed| !closed.load(Ordering::SeqCst))
            .count()
    }

    /// Control-plane connections opened and not yet closed.
    pub fn open_control_connections(&self) -> usize {
        lock(&self.state).open_control_connections
    }

    /// All consumers ever created, in creation order.
    pub fn consumers(&self) -> Vec<ConsumerInfo> {
        lock(&self.state)
            .consumers
            .iter()
            .map(|c| ConsumerInfo {
                id: c.id,
                name: c.name.clone(),
                stream: c.stream.clone(),
                closed: c.is_closed(),
            })
            .collect()
    }
}

#[async_trait]
impl StreamProtocol for MemoryBroker {
    async fn open(&self, opts: &EnvironmentOptions) -> Result<Arc<dyn Environment>, BrokerError> {
        let mut state = lock(&self.state);
        state.opens += 1;
        state.dial(opts.authority())?;

        let closed = Arc::new(AtomicBool::new(false));
        state.environments.push(Arc::clone(&closed));
        Ok(Arc::new(MemoryEnvironment {
            state: Arc::clone(&self.state),
            closed,
        }))
    }
}

#[async_trait]
impl ControlPlane for MemoryBroker {
    async fn connect(
        &self,
        addr: &ControlAddress,
    ) -> Result<Box<dyn ControlConnection>, BrokerError> {
        let mut state = lock(&self.state);
        state.dial(addr.authority())?;
        state.open_control_connections += 1;
        Ok(Box::new(MemoryControlConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryEnvironment {
    state: Shared,
    closed: Arc<AtomicBool>,
}

impl MemoryEnvironment {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed {
                resource: "environment",
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Environment for MemoryEnvironment {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn declare_stream(
        &self,
        name: &str,
        retention: &StreamRetention,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        if state.faults.stream_declare.contains(name) {
            return Err(BrokerError::Protocol {
                reason: format!("declare of stream '{name}' refused"),
            });
        }
        match state.streams.get(name).map(|log| log.retention == *retention) {
            Some(true) => {}
            Some(false) => {
                return Err(BrokerError::PreconditionFailed {
                    entity: "stream",
                    name: name.to_string(),
                    reason: "retention differs from the existing stream".into(),
                });
            }
            None => {
                state.streams.insert(
                    name.to_string(),
                    StreamLog {
                        retention: retention.clone(),
                        messages: Vec::new(),
                    },
                );
            }
        }
        state.declarations.push(Declaration::Stream(name.to_string()));
        Ok(())
    }

    async fn delete_stream(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let attached = {
            let mut state = lock(&self.state);
            if state.faults.stream_delete {
                return Err(BrokerError::Protocol {
                    reason: format!("delete of stream '{name}' refused"),
                });
            }
            if state.streams.remove(name).is_none() {
                return Err(BrokerError::NotFound {
                    entity: "stream",
                    name: name.to_string(),
                });
            }
            state.bindings.retain(|b| b.queue != name);
            state.open_consumers_where(|c| c.stream == name)
        };
        for consumer in attached {
            consumer.shut("stream deleted");
        }
        Ok(())
    }

    async fn consumer(
        &self,
        stream: &str,
        opts: ConsumerOptions,
        handler: MessageHandler,
    ) -> Result<Arc<dyn Consumer>, BrokerError> {
        self.ensure_open()?;
        let (consumer, backlog) = {
            let mut state = lock(&self.state);
            let log = state
                .streams
                .get(stream)
                .ok_or_else(|| BrokerError::NotFound {
                    entity: "stream",
                    name: stream.to_string(),
                })?;

            let backlog: Vec<Message> = match opts.offset {
                OffsetSpec::First | OffsetSpec::Timestamp(_) => log.messages.clone(),
                OffsetSpec::Next => Vec::new(),
                OffsetSpec::Last => log.messages.last().cloned().into_iter().collect(),
                OffsetSpec::Offset(from) => log
                    .messages
                    .iter()
                    .filter(|m| m.offset >= from)
                    .cloned()
                    .collect(),
            };

            let (close_tx, _) = watch::channel(None);
            let consumer = Arc::new(MemoryConsumer {
                id: state.consumers.len() as u64,
                name: opts.name,
                stream: stream.to_string(),
                handler,
                environment: Arc::clone(&self.closed),
                closed: AtomicBool::new(false),
                close_tx,
                state: Arc::clone(&self.state),
            });
            state.consumers.push(Arc::clone(&consumer));
            (consumer, backlog)
        };

        for message in backlog {
            consumer.deliver(message);
        }
        Ok(consumer)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed {
                resource: "environment",
            });
        }
        let attached = {
            let mut state = lock(&self.state);
            state
                .environments
                .retain(|env| !Arc::ptr_eq(env, &self.closed));
            state.open_consumers_where(|c| Arc::ptr_eq(&c.environment, &self.closed))
        };
        for consumer in attached {
            consumer.shut("environment closed");
        }
        Ok(())
    }
}

struct MemoryConsumer {
    id: u64,
    name: String,
    stream: String,
    handler: MessageHandler,
    environment: Arc<AtomicBool>,
    closed: AtomicBool,
    close_tx: watch::Sender<Option<ConsumerClosed>>,
    state: Shared,
}

impl MemoryConsumer {
    fn deliver(&self, message: Message) {
        if self.is_closed() {
            return;
        }
        let ctx = ConsumerContext {
            consumer: Arc::from(self.name.as_str()),
            stream: Arc::from(self.stream.as_str()),
        };
        (self.handler)(ctx, message);
    }

    /// Marks the consumer closed and notifies waiters; no-op if already closed.
    fn shut(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close_tx.send_replace(Some(ConsumerClosed {
            name: self.name.clone(),
            stream: self.stream.clone(),
            reason: reason.to_string(),
        }));
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream(&self) -> &str {
        &self.stream
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::AlreadyClosed {
                resource: "consumer",
            });
        }
        if lock(&self.state).faults.consumer_close.contains(&self.id) {
            return Err(BrokerError::Protocol {
                reason: format!("close of consumer {} refused", self.id),
            });
        }
        self.shut("closed by client");
        Ok(())
    }

    async fn closed(&self) -> ConsumerClosed {
        let mut rx = self.close_tx.subscribe();
        let event = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|ev| (*ev).clone());
        event.unwrap_or_else(|| ConsumerClosed {
            name: self.name.clone(),
            stream: self.stream.clone(),
            reason: "consumer dropped".into(),
        })
    }
}

struct MemoryControlConnection {
    state: Shared,
    closed: AtomicBool,
}

#[async_trait]
impl ControlConnection for MemoryControlConnection {
    async fn channel(&self) -> Result<Box<dyn ControlChannel>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed {
                resource: "connection",
            });
        }
        Ok(Box::new(MemoryControlChannel {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed {
                resource: "connection",
            });
        }
        let mut state = lock(&self.state);
        state.open_control_connections = state.open_control_connections.saturating_sub(1);
        Ok(())
    }
}

struct MemoryControlChannel {
    state: Shared,
    closed: AtomicBool,
}

impl MemoryControlChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed {
                resource: "channel",
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlChannel for MemoryControlChannel {
    async fn exchange_declare(&self, exchange: &ExchangeConfig) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        if state.faults.exchange_declare.contains(&exchange.name) {
            return Err(BrokerError::Protocol {
                reason: format!("declare of exchange '{}' refused", exchange.name),
            });
        }
        let equivalent = state.exchanges.get(&exchange.name).map(|existing| {
            existing.kind == exchange.kind
                && existing.durable == exchange.durable
                && existing.auto_delete == exchange.auto_delete
                && existing.internal == exchange.internal
        });
        match equivalent {
            Some(true) => {}
            Some(false) => {
                return Err(BrokerError::PreconditionFailed {
                    entity: "exchange",
                    name: exchange.name.clone(),
                    reason: "inequivalent arguments".into(),
                });
            }
            None => {
                state
                    .exchanges
                    .insert(exchange.name.clone(), exchange.clone());
            }
        }
        state
            .declarations
            .push(Declaration::Exchange(exchange.name.clone()));
        Ok(())
    }

    async fn queue_bind(&self, binding: &BindingConfig) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        if state
            .faults
            .binding
            .contains(&(binding.exchange.clone(), binding.queue.clone()))
        {
            return Err(BrokerError::Protocol {
                reason: format!(
                    "binding '{}' -> '{}' refused",
                    binding.exchange, binding.queue
                ),
            });
        }
        if !state.exchanges.contains_key(&binding.exchange) {
            return Err(BrokerError::NotFound {
                entity: "exchange",
                name: binding.exchange.clone(),
            });
        }
        if !state.streams.contains_key(&binding.queue) {
            return Err(BrokerError::NotFound {
                entity: "queue",
                name: binding.queue.clone(),
            });
        }
        let duplicate = state.bindings.iter().any(|b| {
            b.exchange == binding.exchange
                && b.queue == binding.queue
                && b.routing_key == binding.routing_key
        });
        if !duplicate {
            state.bindings.push(binding.clone());
        }
        state.declarations.push(Declaration::Binding {
            exchange: binding.exchange.clone(),
            queue: binding.queue.clone(),
            routing_key: binding.routing_key.clone(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyClosed {
                resource: "channel",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::config::{ClientConfig, ExchangeKind, StreamConfig};

    fn env_opts() -> EnvironmentOptions {
        ClientConfig::new(StreamConfig::new("events")).environment_options()
    }

    fn counting_handler(count: Arc<AtomicUsize>) -> MessageHandler {
        Arc::new(move |_ctx, _msg| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn first(name: &str) -> ConsumerOptions {
        ConsumerOptions {
            name: name.to_string(),
            offset: OffsetSpec::First,
            crc_check: false,
        }
    }

    #[tokio::test]
    async fn test_fail_next_opens_counts_down() {
        let broker = MemoryBroker::new();
        broker.fail_next_opens(2);

        assert!(broker.open(&env_opts()).await.is_err());
        assert!(broker.open(&env_opts()).await.is_err());
        assert!(broker.open(&env_opts()).await.is_ok());
        assert_eq!(broker.environment_opens(), 3);
        assert_eq!(broker.open_environments(), 1);
    }

    #[tokio::test]
    async fn test_redeclare_stream_is_idempotent_unless_retention_differs() {
        let broker = MemoryBroker::new();
        let env = broker.open(&env_opts()).await.unwrap();
        let retention = StreamRetention::default();

        env.declare_stream("events", &retention).await.unwrap();
        env.declare_stream("events", &retention).await.unwrap();

        let other = StreamRetention {
            max_age: Some(std::time::Duration::from_secs(60)),
            ..StreamRetention::default()
        };
        let err = env.declare_stream("events", &other).await.unwrap_err();
        assert!(matches!(err, BrokerError::PreconditionFailed { .. }));
    }

    #[tokio::test]
    async fn test_first_offset_replays_backlog() {
        let broker = MemoryBroker::new();
        let env = broker.open(&env_opts()).await.unwrap();
        env.declare_stream("events", &StreamRetention::default())
            .await
            .unwrap();
        broker.publish("events", "a").unwrap();
        broker.publish("events", "b").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let _consumer = env
            .consumer("events", first("c"), counting_handler(count.clone()))
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        broker.publish("events", "c").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disconnect_closes_environment_and_consumers() {
        let broker = MemoryBroker::new();
        let env = broker.open(&env_opts()).await.unwrap();
        env.declare_stream("events", &StreamRetention::default())
            .await
            .unwrap();
        let consumer = env
            .consumer("events", first("c"), Arc::new(|_: ConsumerContext, _: Message| {}))
            .await
            .unwrap();

        broker.disconnect_all();

        assert!(env.is_closed());
        assert!(consumer.is_closed());
        assert_eq!(consumer.closed().await.reason, "connection lost");
        assert!(matches!(
            env.declare_stream("events", &StreamRetention::default()).await,
            Err(BrokerError::AlreadyClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_binding_requires_both_ends() {
        let broker = MemoryBroker::new();
        let addr = ClientConfig::new(StreamConfig::new("events")).control_address();
        let conn = broker.connect(&addr).await.unwrap();
        let ch = conn.channel().await.unwrap();

        let err = ch
            .queue_bind(&BindingConfig::new("ex1", "events", "#"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { entity: "exchange", .. }));

        ch.exchange_declare(&ExchangeConfig::new("ex1", ExchangeKind::Topic))
            .await
            .unwrap();
        let err = ch
            .queue_bind(&BindingConfig::new("ex1", "events", "#"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { entity: "queue", .. }));

        ch.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(broker.open_control_connections(), 0);
    }
}
