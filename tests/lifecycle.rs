//! End-to-end lifecycle against the in-process broker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use amqpstream::broker::memory::{Declaration, MemoryBroker};
use amqpstream::broker::{ConsumerContext, Message, MessageHandler};
use amqpstream::{
    BindingConfig, BrokerError, ClientConfig, ClientError, ClientSupervisor, ConnectionState,
    EventKind, ExchangeConfig, ExchangeKind, HealthStatus, ReconnectPolicy, SessionEnd,
    StreamClient, StreamConfig,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn orders_config() -> ClientConfig {
    ClientConfig::new(StreamConfig::new("events"))
        .with_exchange(ExchangeConfig::new("ex1", ExchangeKind::Topic))
        .with_binding(BindingConfig::new("ex1", "events", "orders.*"))
}

fn client_for(cfg: ClientConfig, broker: &Arc<MemoryBroker>) -> StreamClient {
    StreamClient::builder(cfg, Arc::clone(broker)).build()
}

fn noop() -> MessageHandler {
    Arc::new(|_: ConsumerContext, _: Message| {})
}

fn counting(count: &Arc<AtomicUsize>) -> MessageHandler {
    let count = Arc::clone(count);
    Arc::new(move |_: ConsumerContext, _: Message| {
        count.fetch_add(1, Ordering::SeqCst);
    })
}

fn drain(rx: &mut broadcast::Receiver<amqpstream::Event>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        kinds.push(ev.kind);
    }
    kinds
}

#[tokio::test]
async fn connect_then_is_connected() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    assert!(!client.is_connected());

    client.connect().await?;

    assert!(client.is_connected());
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.check_health().status, HealthStatus::Ok);
    assert_eq!(client.check_health().message, "AMQP Connected");
    Ok(())
}

#[tokio::test]
async fn scenario_provisions_stream_exchange_and_binding() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);

    client.connect().await?;

    assert!(broker.has_stream("events"));
    let ex = broker.exchange("ex1").expect("exchange declared");
    assert_eq!(ex.kind, ExchangeKind::Topic);
    assert_eq!(
        broker.bindings(),
        vec![BindingConfig::new("ex1", "events", "orders.*")]
    );
    assert_eq!(
        broker.declarations(),
        vec![
            Declaration::Stream("events".into()),
            Declaration::Exchange("ex1".into()),
            Declaration::Binding {
                exchange: "ex1".into(),
                queue: "events".into(),
                routing_key: "orders.*".into(),
            },
        ]
    );
    assert_eq!(broker.open_control_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_stream_declare_skips_exchanges_and_bindings() {
    let broker = Arc::new(MemoryBroker::new());
    broker.fail_stream_declare("events");
    let mut client = client_for(orders_config(), &broker);

    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, ClientError::Broker(BrokerError::Protocol { .. })));
    assert!(broker.declarations().is_empty());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn failed_exchange_keeps_earlier_ones_and_skips_later_ones() {
    let broker = Arc::new(MemoryBroker::new());
    broker.fail_exchange_declare("ex2");
    let cfg = ClientConfig::new(StreamConfig::new("events"))
        .with_exchange(ExchangeConfig::new("ex1", ExchangeKind::Topic))
        .with_exchange(ExchangeConfig::new("ex2", ExchangeKind::Fanout))
        .with_exchange(ExchangeConfig::new("ex3", ExchangeKind::Direct))
        .with_binding(BindingConfig::new("ex1", "events", "#"));
    let mut client = client_for(cfg, &broker);

    assert!(client.connect().await.is_err());

    assert_eq!(
        broker.declarations(),
        vec![
            Declaration::Stream("events".into()),
            Declaration::Exchange("ex1".into()),
        ]
    );
    assert!(broker.exchange("ex3").is_none());
    assert!(broker.bindings().is_empty());
}

#[tokio::test]
async fn broker_errors_are_returned_unwrapped() {
    let broker = Arc::new(MemoryBroker::new());
    broker.set_unreachable(true);
    let mut client = client_for(orders_config(), &broker);

    let err = client.connect().await.unwrap_err();

    assert_eq!(err.as_label(), "broker_unreachable");
    assert_eq!(
        err.to_string(),
        "broker unreachable at localhost:5552: connection refused"
    );
}

#[tokio::test(start_paused = true)]
async fn reconnect_counts_failed_iterations_and_waits_fixed_backoff() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;

    broker.disconnect_all();
    assert!(!client.is_connected());
    broker.fail_next_opens(3);

    let started = tokio::time::Instant::now();
    let failed = client.reconnect(&CancellationToken::new()).await?;

    assert_eq!(failed, 3);
    assert!(started.elapsed() >= Duration::from_millis(3 * 2000));
    assert!(client.is_connected());
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(broker.open_environments(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconnect_publishes_state_machine_events() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;
    let mut rx = client.events();

    broker.disconnect_all();
    broker.fail_next_opens(1);
    client.reconnect(&CancellationToken::new()).await?;

    let kinds = drain(&mut rx);
    let failed_at = kinds
        .iter()
        .position(|k| *k == EventKind::ReconnectFailed)
        .expect("one failed iteration");
    assert_eq!(kinds[0], EventKind::ReconnectScheduled);
    assert_eq!(kinds[1], EventKind::ReconnectAttempt);
    assert_eq!(kinds[failed_at + 1], EventKind::ReconnectScheduled);
    assert_eq!(kinds.last(), Some(&EventKind::Reconnected));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconnect_of_a_live_connection_rebuilds_topology() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;
    client.consume(noop()).await?;
    broker.publish("events", "old")?;

    let failed = client.reconnect(&CancellationToken::new()).await?;

    assert_eq!(failed, 0);
    assert!(client.consumers().is_empty());
    assert!(broker.consumers()[0].closed);
    // Teardown deleted the stream; connect declared it again, empty.
    let seen = Arc::new(AtomicUsize::new(0));
    client.consume(counting(&seen)).await?;
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(broker.bindings().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn bounded_policy_gives_up() {
    let broker = Arc::new(MemoryBroker::new());
    broker.set_unreachable(true);
    let mut client = StreamClient::builder(orders_config(), Arc::clone(&broker))
        .with_reconnect_policy(ReconnectPolicy::default().with_max_attempts(3))
        .build();

    let err = client
        .reconnect(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ClientError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.as_label(), "broker_unreachable");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(broker.environment_opens(), 3);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_reconnect() {
    let broker = Arc::new(MemoryBroker::new());
    broker.set_unreachable(true);
    let mut client = client_for(orders_config(), &broker);

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });

    let err = client.reconnect(&token).await.unwrap_err();

    assert!(matches!(err, ClientError::Canceled));
    // Iterations at 2s and 4s ran; the third sleep was interrupted.
    assert_eq!(broker.environment_opens(), 2);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn close_consumers_stops_at_first_failure() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;
    for _ in 0..3 {
        client.consume(noop()).await?;
    }
    broker.fail_consumer_close(1);

    let err = client.close_consumers().await.unwrap_err();

    assert_eq!(err.as_label(), "broker_protocol");
    let closed: Vec<bool> = broker.consumers().iter().map(|c| c.closed).collect();
    assert_eq!(closed, vec![true, false, false]);
    assert_eq!(client.consumers().len(), 2);
    Ok(())
}

#[tokio::test]
async fn consume_returns_before_close_and_close_is_observed() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;
    let mut rx = client.events();

    let seen = Arc::new(AtomicUsize::new(0));
    let consumer = client.consume(counting(&seen)).await?;
    assert!(!consumer.is_closed());
    broker.publish("events", "one")?;
    broker.publish("events", "two")?;
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    broker.disconnect_all();
    loop {
        let ev = rx.recv().await?;
        if ev.kind == EventKind::ConsumerClosed {
            assert_eq!(ev.reason.as_deref(), Some("connection lost"));
            break;
        }
    }
    assert!(!client.is_connected());
    assert_eq!(client.check_health().message, "AMQP Disconnected");
    Ok(())
}

#[tokio::test]
async fn consume_until_closes_consumers_on_cancel() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        cancel.cancel();
    });
    let end = client.consume_until(noop(), &token).await?;

    assert_eq!(end, SessionEnd::Canceled);
    assert!(client.consumers().is_empty());
    assert!(broker.consumers().iter().all(|c| c.closed));
    Ok(())
}

fn spawn_session(
    shared: &Arc<tokio::sync::Mutex<StreamClient>>,
    token: &CancellationToken,
) -> tokio::task::JoinHandle<Result<SessionEnd, ClientError>> {
    let shared = Arc::clone(shared);
    let token = token.clone();
    tokio::spawn(async move {
        let mut client = shared.lock().await;
        client.consume_until(noop(), &token).await
    })
}

#[tokio::test(start_paused = true)]
async fn supervised_session_ends_on_connection_loss_and_recovery_runs() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;
    let sup = ClientSupervisor::spawn(client);
    let shared = sup.client();
    let token = CancellationToken::new();

    let session = spawn_session(&shared, &token);
    while broker.consumers().is_empty() {
        tokio::task::yield_now().await;
    }
    broker.disconnect_all();

    let end = session.await??;
    assert!(matches!(end, SessionEnd::Closed(ref closed) if closed.reason == "connection lost"));

    let mut live = sup.liveness();
    live.wait_for(|s| matches!(s, ConnectionState::Retrying { .. }))
        .await;
    live.wait_for(|s| *s == ConnectionState::Connected).await;
    assert_eq!(broker.environment_opens(), 2);

    let resumed = spawn_session(&shared, &token);
    while broker.consumers().len() < 2 {
        tokio::task::yield_now().await;
    }
    token.cancel();
    assert_eq!(resumed.await??, SessionEnd::Canceled);

    sup.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn dispose_twice_reports_already_closed() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;
    client.consume(noop()).await?;
    let mut rx = client.events();

    client.dispose().await?;
    let second = client.dispose().await;

    assert!(matches!(second, Err(ClientError::AlreadyClosed)));
    assert_eq!(client.state(), ConnectionState::Disposed);
    assert!(!broker.has_stream("events"));
    assert_eq!(broker.open_environments(), 0);
    let kinds = drain(&mut rx);
    assert_eq!(kinds.first(), Some(&EventKind::Disposing));
    assert!(kinds.contains(&EventKind::Disposed));
    Ok(())
}

#[tokio::test]
async fn dispose_after_connection_loss_succeeds() -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(orders_config(), &broker);
    client.connect().await?;
    client.consume(noop()).await?;

    broker.disconnect_all();
    client.dispose().await?;

    assert_eq!(client.state(), ConnectionState::Disposed);
    assert!(client.consumers().is_empty());
    Ok(())
}

#[tokio::test]
async fn settings_document_drives_a_connection() -> anyhow::Result<()> {
    let doc = br#"{
        "amqpStreamSettings": {
            "host": "rabbit",
            "user": "grafana",
            "password": "from-document",
            "streamOptions": { "streamName": "events", "maxAge": 3600, "maxLengthBytes": "2GB" },
            "exchanges": [ { "name": "ex1", "type": "topic" } ],
            "bindings": [ { "exchangeName": "ex1", "queueName": "events", "routingKey": "orders.*" } ]
        }
    }"#;
    let secrets = HashMap::from([("password".to_string(), "s3cret".to_string())]);
    let cfg = ClientConfig::from_settings(doc, &secrets)?;
    assert_eq!(cfg.password, "s3cret");

    let broker = Arc::new(MemoryBroker::new());
    let mut client = client_for(cfg, &broker);
    client.connect().await?;

    let retention = broker.stream_retention("events").expect("stream declared");
    assert_eq!(retention.max_age, Some(Duration::from_secs(3600)));
    assert_eq!(
        retention.max_length_bytes.map(|b| b.bytes()),
        Some(2_000_000_000)
    );
    assert_eq!(broker.bindings().len(), 1);
    Ok(())
}
