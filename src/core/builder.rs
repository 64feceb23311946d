use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    broker::{ControlPlane, StreamProtocol},
    config::ClientConfig,
    core::{client::StreamClient, config::RuntimeConfig},
    events::Bus,
    policies::ReconnectPolicy,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for [`StreamClient`].
pub struct StreamClientBuilder {
    config: ClientConfig,
    runtime: RuntimeConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    control: Arc<dyn ControlPlane>,
    protocol: Arc<dyn StreamProtocol>,
}

impl StreamClientBuilder {
    pub(crate) fn new<B>(config: ClientConfig, broker: Arc<B>) -> Self
    where
        B: ControlPlane + StreamProtocol,
    {
        let control: Arc<dyn ControlPlane> = broker.clone();
        let protocol: Arc<dyn StreamProtocol> = broker;
        Self {
            config,
            runtime: RuntimeConfig::default(),
            subscribers: Vec::new(),
            control,
            protocol,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each one gets its own worker and bounded queue; see [`SubscriberSet`].
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn with_runtime_config(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Overrides only the reconnect policy.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.runtime.reconnect = policy;
        self
    }

    /// Builds the client.
    ///
    /// With subscribers configured this spawns their workers and the bus listener, so it
    /// must run inside a tokio runtime. The listener stops when the client is dropped.
    pub fn build(self) -> StreamClient {
        let bus = Bus::new(self.runtime.bus_capacity_clamped());
        let listener = if self.subscribers.is_empty() {
            None
        } else {
            Some(spawn_listener(&bus, self.subscribers))
        };
        StreamClient::from_parts(
            self.config,
            self.runtime,
            self.control,
            self.protocol,
            bus,
            listener,
        )
    }
}

/// Forwards bus events to the subscriber set until the returned guard is dropped.
fn spawn_listener(bus: &Bus, subscribers: Vec<Arc<dyn Subscribe>>) -> DropGuard {
    let set = SubscriberSet::new(subscribers, bus.clone());
    let mut rx = bus.subscribe();
    let token = CancellationToken::new();
    let stop = token.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        set.shutdown().await;
    });
    token.drop_guard()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::config::StreamConfig;
    use crate::events::{Event, EventKind};

    #[derive(Default)]
    struct Probe {
        kinds: Mutex<Vec<EventKind>>,
        connected: Notify,
    }

    #[async_trait]
    impl Subscribe for Probe {
        async fn on_event(&self, ev: &Event) {
            self.kinds.lock().unwrap().push(ev.kind);
            if ev.kind == EventKind::Connected {
                self.connected.notify_one();
            }
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_client_events() {
        let probe = Arc::new(Probe::default());
        let broker = Arc::new(MemoryBroker::new());
        let mut client = StreamClient::builder(ClientConfig::new(StreamConfig::new("events")), broker)
            .with_subscriber(probe.clone())
            .build();

        client.connect().await.unwrap();
        probe.connected.notified().await;

        assert_eq!(
            *probe.kinds.lock().unwrap(),
            vec![EventKind::Connecting, EventKind::Declared, EventKind::Connected]
        );
    }

    #[test]
    fn test_reconnect_policy_override_keeps_other_settings() {
        let broker = Arc::new(MemoryBroker::new());
        let policy = ReconnectPolicy::default().with_max_attempts(3);
        let client = StreamClient::builder(ClientConfig::new(StreamConfig::new("events")), broker)
            .with_reconnect_policy(policy)
            .build();

        assert_eq!(client.runtime().reconnect, policy);
        assert_eq!(client.runtime().bus_capacity, 1024);
    }
}
