use crate::broker::ControlPlane;
use crate::config::{ControlAddress, ExchangeConfig};
use crate::error::BrokerError;
use crate::topology::ControlSession;

/// Declares one exchange over its own control connection.
pub(crate) async fn declare(
    control: &dyn ControlPlane,
    addr: &ControlAddress,
    exchange: &ExchangeConfig,
) -> Result<(), BrokerError> {
    let session = ControlSession::open(control, addr).await?;
    let outcome = session.channel().exchange_declare(exchange).await;
    session.finish(outcome).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::config::{ClientConfig, ExchangeKind, StreamConfig};

    fn addr() -> ControlAddress {
        ClientConfig::new(StreamConfig::new("events")).control_address()
    }

    #[tokio::test]
    async fn test_declares_and_closes_session() {
        let broker = MemoryBroker::new();
        let ex = ExchangeConfig::new("ex1", ExchangeKind::Topic);

        declare(&broker, &addr(), &ex).await.unwrap();

        assert_eq!(broker.exchange("ex1"), Some(ex));
        assert_eq!(broker.open_control_connections(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_verbatim_and_session_still_closed() {
        let broker = MemoryBroker::new();
        broker.fail_exchange_declare("ex1");

        let err = declare(&broker, &addr(), &ExchangeConfig::new("ex1", ExchangeKind::Topic))
            .await
            .unwrap_err();

        assert_eq!(err.as_label(), "broker_protocol");
        assert_eq!(broker.open_control_connections(), 0);
    }

    #[tokio::test]
    async fn test_mismatched_redeclare_is_rejected() {
        let broker = MemoryBroker::new();
        declare(&broker, &addr(), &ExchangeConfig::new("ex1", ExchangeKind::Topic))
            .await
            .unwrap();

        let err = declare(&broker, &addr(), &ExchangeConfig::new("ex1", ExchangeKind::Fanout))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::PreconditionFailed { .. }));
    }
}
