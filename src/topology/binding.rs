use crate::broker::ControlPlane;
use crate::config::{BindingConfig, ControlAddress};
use crate::error::BrokerError;
use crate::topology::ControlSession;

/// Binds a queue/stream to an exchange over its own control connection.
pub(crate) async fn declare(
    control: &dyn ControlPlane,
    addr: &ControlAddress,
    binding: &BindingConfig,
) -> Result<(), BrokerError> {
    let session = ControlSession::open(control, addr).await?;
    let outcome = session.channel().queue_bind(binding).await;
    session.finish(outcome).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::config::{ClientConfig, StreamConfig};

    #[tokio::test]
    async fn test_missing_exchange_is_reported_and_session_closed() {
        let broker = MemoryBroker::new();
        let addr = ClientConfig::new(StreamConfig::new("events")).control_address();

        let err = declare(&broker, &addr, &BindingConfig::new("nope", "events", "#"))
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::NotFound { entity: "exchange", .. }));
        assert_eq!(broker.open_control_connections(), 0);
        assert!(broker.bindings().is_empty());
    }
}
