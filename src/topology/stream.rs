//! # Stream provisioner.
//!
//! [`StreamProvisioner`] owns the stream descriptor and the consumers attached to it.
//!
//! ```text
//! consume(env, handler)
//!   ├─► env.consumer(stream, {offset: First, crc: off}, handler)
//!   ├─► track handle
//!   ├─► spawn close observer ──► consumer.closed().await ──► Bus: ConsumerClosed
//!   └─► return handle (never waits for the close)
//! ```

use std::sync::Arc;

use crate::broker::{
    Consumer, ConsumerOptions, Environment, MessageHandler, OffsetSpec, StreamRetention,
};
use crate::config::StreamConfig;
use crate::error::BrokerError;
use crate::events::{Bus, Event, EventKind};

/// Stream descriptor plus its live consumer handles.
pub struct StreamProvisioner {
    config: StreamConfig,
    consumers: Vec<Arc<dyn Consumer>>,
}

impl StreamProvisioner {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            consumers: Vec::new(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Tracked consumer handles, in creation order.
    pub fn consumers(&self) -> &[Arc<dyn Consumer>] {
        &self.consumers
    }

    /// Declares the stream with its configured retention.
    pub async fn declare(&self, env: &dyn Environment) -> Result<(), BrokerError> {
        env.declare_stream(&self.config.name, &StreamRetention::from(&self.config))
            .await
    }

    /// Attaches a consumer reading from the first retained message.
    ///
    /// The handle is returned as soon as the broker accepts the subscription; a background
    /// observer reports its eventual close on `bus`.
    pub async fn consume(
        &mut self,
        env: &dyn Environment,
        handler: MessageHandler,
        bus: &Bus,
    ) -> Result<Arc<dyn Consumer>, BrokerError> {
        let opts = ConsumerOptions {
            name: self.config.consumer_name.clone(),
            offset: OffsetSpec::First,
            crc_check: false,
        };
        let consumer = env.consumer(&self.config.name, opts, handler).await?;
        self.consumers.push(Arc::clone(&consumer));

        bus.publish(
            Event::new(EventKind::ConsumerStarted)
                .with_stream(consumer.stream())
                .with_subject(consumer.name()),
        );
        observe_close(Arc::clone(&consumer), bus.clone());
        Ok(consumer)
    }

    /// Closes tracked consumers in creation order, stopping at the first failure.
    ///
    /// Consumers closed here (or already closed by the broker) leave tracking; the
    /// failing consumer and everything after it stay tracked for a later retry.
    pub async fn close_consumers(&mut self) -> Result<(), BrokerError> {
        let mut done = 0;
        let mut outcome = Ok(());
        for consumer in &self.consumers {
            let result = if consumer.is_closed() {
                Ok(())
            } else {
                consumer.close().await
            };
            if let Err(err) = result {
                outcome = Err(err);
                break;
            }
            done += 1;
        }
        self.consumers.drain(..done);
        outcome
    }

    /// Closes one consumer (unless the broker already did) and stops tracking it.
    ///
    /// Other tracked consumers are left alone. On failure the handle stays tracked.
    pub async fn close_consumer(
        &mut self,
        consumer: &Arc<dyn Consumer>,
    ) -> Result<(), BrokerError> {
        if !consumer.is_closed() {
            match consumer.close().await {
                Ok(()) | Err(BrokerError::AlreadyClosed { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        self.untrack(consumer);
        Ok(())
    }

    /// Stops tracking `consumer` without closing it.
    pub(crate) fn untrack(&mut self, consumer: &Arc<dyn Consumer>) {
        self.consumers
            .retain(|tracked| !std::ptr::addr_eq(Arc::as_ptr(tracked), Arc::as_ptr(consumer)));
    }

    /// Drops every handle without closing it.
    ///
    /// Used when the environment is gone and the broker already released them.
    pub(crate) fn forget_consumers(&mut self) {
        self.consumers.clear();
    }

    /// Deletes the stream.
    pub async fn delete(&self, env: &dyn Environment) -> Result<(), BrokerError> {
        env.delete_stream(&self.config.name).await
    }
}

fn observe_close(consumer: Arc<dyn Consumer>, bus: Bus) {
    tokio::spawn(async move {
        let closed = consumer.closed().await;
        bus.publish(
            Event::new(EventKind::ConsumerClosed)
                .with_stream(closed.stream)
                .with_subject(closed.name)
                .with_reason(closed.reason),
        );
    });
}
