//! Error types used by the stream client and its broker capabilities.
//!
//! This module defines two main error enums:
//!
//! - [`BrokerError`]: errors reported by a broker capability (control plane or stream protocol).
//! - [`ClientError`]: errors raised by the connection lifecycle manager itself.
//!
//! Broker errors are carried through [`ClientError::Broker`] transparently, so the
//! broker's own diagnostic is what callers see.
//!
//! Both types provide `as_label` for logging/metrics.

use thiserror::Error;

/// # Errors reported by a broker capability.
///
/// Implementations of the [`broker`](crate::broker) traits map their transport/protocol
/// failures onto these variants.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached (dial/open failure).
    #[error("broker unreachable at {addr}: {reason}")]
    Unreachable {
        /// `host:port` that was dialed.
        addr: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The broker rejected or failed an operation.
    #[error("broker protocol error: {reason}")]
    Protocol {
        /// Broker-provided reason.
        reason: String,
    },

    /// The connection, channel, environment or consumer is already closed.
    #[error("{resource} is already closed")]
    AlreadyClosed {
        /// Which resource was used after close.
        resource: &'static str,
    },

    /// A referenced entity (stream, exchange, queue) does not exist.
    #[error("{entity} '{name}' not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Entity name.
        name: String,
    },

    /// A declaration conflicts with an existing entity of the same name.
    #[error("precondition failed for {entity} '{name}': {reason}")]
    PreconditionFailed {
        /// Entity kind.
        entity: &'static str,
        /// Entity name.
        name: String,
        /// Broker-provided reason.
        reason: String,
    },
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use amqpstream::BrokerError;
    ///
    /// let err = BrokerError::AlreadyClosed { resource: "environment" };
    /// assert_eq!(err.as_label(), "broker_already_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Unreachable { .. } => "broker_unreachable",
            BrokerError::Protocol { .. } => "broker_protocol",
            BrokerError::AlreadyClosed { .. } => "broker_already_closed",
            BrokerError::NotFound { .. } => "broker_not_found",
            BrokerError::PreconditionFailed { .. } => "broker_precondition_failed",
        }
    }
}

/// # Errors produced by the stream client.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClientError {
    /// Broker capability failure, passed through unchanged.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Configuration is missing a required value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },

    /// Settings document could not be decoded.
    #[error("invalid settings document: {0}")]
    Settings(#[from] serde_json::Error),

    /// Operation requires an open environment.
    #[error("client is not connected")]
    NotConnected,

    /// Client was disposed; no further use is valid.
    #[error("client is already closed")]
    AlreadyClosed,

    /// Operation was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Canceled,

    /// Reconnect policy ran out of attempts.
    #[error("reconnect gave up after {attempts} attempts; last error: {last}")]
    RetriesExhausted {
        /// Failed iterations performed.
        attempts: u32,
        /// Error of the final iteration.
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// Broker errors keep their own label.
    ///
    /// # Example
    /// ```
    /// use amqpstream::ClientError;
    ///
    /// assert_eq!(ClientError::NotConnected.as_label(), "client_not_connected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::Broker(e) => e.as_label(),
            ClientError::InvalidConfig { .. } => "client_invalid_config",
            ClientError::Settings(_) => "client_settings",
            ClientError::NotConnected => "client_not_connected",
            ClientError::AlreadyClosed => "client_already_closed",
            ClientError::Canceled => "client_canceled",
            ClientError::RetriesExhausted { .. } => "client_retries_exhausted",
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        ClientError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_error_is_transparent() {
        let inner = BrokerError::Protocol {
            reason: "NOT_FOUND - no exchange 'ex1'".into(),
        };
        let err = ClientError::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.as_label(), "broker_protocol");
    }

    #[test]
    fn test_retries_exhausted_carries_last_error() {
        let err = ClientError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ClientError::NotConnected),
        };
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(err.to_string().contains("not connected"));
    }
}
