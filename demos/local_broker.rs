//! # Example: supervised client against the in-process broker
//!
//! Connects, consumes, loses the connection twice and lets the supervisor recover it.
//! Run with `RUST_LOG=amqpstream=debug` to see every provisioning step.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use amqpstream::broker::memory::MemoryBroker;
use amqpstream::broker::{ConsumerContext, Message};
use amqpstream::{
    BindingConfig, ClientConfig, ClientSupervisor, ConnectionState, ExchangeConfig, ExchangeKind,
    LogWriter, RuntimeConfig, StreamClient, StreamConfig, Subscribe,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("amqpstream=info")),
        )
        .init();

    let cfg = ClientConfig::new(StreamConfig::new("events").with_max_age(Duration::from_secs(3600)))
        .with_exchange(ExchangeConfig::new("ex1", ExchangeKind::Topic))
        .with_binding(BindingConfig::new("ex1", "events", "orders.*"));

    let broker = Arc::new(MemoryBroker::new());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mut client = StreamClient::builder(cfg, Arc::clone(&broker))
        .with_subscribers(subs)
        .with_runtime_config(RuntimeConfig {
            probe_interval: Duration::from_millis(200),
            ..RuntimeConfig::default()
        })
        .build();

    client.connect().await?;

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    client
        .consume(Arc::new(move |ctx: ConsumerContext, msg: Message| {
            counter.fetch_add(1, Ordering::Relaxed);
            println!("[{}] offset={} sections={}", ctx.consumer, msg.offset, msg.data.len());
        }))
        .await?;
    for n in 0..3 {
        broker.publish("events", format!("order #{n}"))?;
    }

    let sup = ClientSupervisor::spawn(client);
    let mut live = sup.liveness();

    for outage in 1..=2u32 {
        println!("--- outage {outage}: broker refuses the next {outage} dials");
        broker.fail_next_opens(outage);
        broker.disconnect_all();

        live.wait_for(|s| matches!(s, ConnectionState::Retrying { .. }))
            .await;
        live.wait_for(|s| *s == ConnectionState::Connected).await;
        println!("--- recovered: {:?}", sup.liveness().check_health());
    }

    println!("messages received before the first outage: {}", received.load(Ordering::Relaxed));
    sup.shutdown().await?;
    // Give the log subscriber a moment to flush the final events.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
