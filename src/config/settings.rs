//! Settings document decoding.
//!
//! The host hands over two pieces: a JSON document with the non-secret settings and a
//! map of decrypted secrets. The document nests the client settings under
//! `amqpStreamSettings`:
//!
//! ```json
//! {
//!   "amqpStreamSettings": {
//!     "host": "rabbit",
//!     "streamPort": 5552,
//!     "amqpPort": 5672,
//!     "vhost": "/",
//!     "user": "grafana",
//!     "requestedHeartbeat": 60,
//!     "streamOptions": { "streamName": "events", "maxAge": 3600, "maxLengthBytes": "2GB" },
//!     "exchanges": [ { "name": "ex1", "type": "topic" } ],
//!     "bindings": [ { "exchangeName": "ex1", "queueName": "events", "routingKey": "orders.*" } ]
//!   }
//! }
//! ```
//!
//! A `password` entry in the secrets map overrides any password in the document.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Key of the password in the decrypted secrets map.
pub const PASSWORD_SECRET: &str = "password";

#[derive(Deserialize)]
struct SettingsDocument {
    #[serde(rename = "amqpStreamSettings")]
    settings: ClientConfig,
}

impl ClientConfig {
    /// Decodes a settings document and applies the decrypted secrets.
    ///
    /// Fails with [`ClientError::Settings`] if the document is malformed or lacks
    /// `amqpStreamSettings.streamOptions`.
    ///
    /// # Example
    /// ```
    /// use std::collections::HashMap;
    /// use amqpstream::ClientConfig;
    ///
    /// let doc = br#"{"amqpStreamSettings": {"host": "rabbit", "streamOptions": {"streamName": "events"}}}"#;
    /// let secrets = HashMap::from([("password".to_string(), "s3cret".to_string())]);
    ///
    /// let cfg = ClientConfig::from_settings(doc, &secrets).unwrap();
    /// assert_eq!(cfg.host, "rabbit");
    /// assert_eq!(cfg.password, "s3cret");
    /// assert_eq!(cfg.stream.name, "events");
    /// ```
    pub fn from_settings(
        json: &[u8],
        secrets: &HashMap<String, String>,
    ) -> Result<Self, ClientError> {
        let doc: SettingsDocument = serde_json::from_slice(json)?;
        let mut cfg = doc.settings;
        if let Some(password) = secrets.get(PASSWORD_SECRET) {
            cfg.password = password.clone();
        }
        Ok(cfg)
    }
}

/// Serde helper: `Duration` as whole seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Default values, matching the stream client's stock environment options.
pub(crate) mod defaults {
    use std::time::Duration;

    pub fn host() -> String {
        "localhost".to_string()
    }
    pub fn stream_port() -> u16 {
        5552
    }
    pub fn amqp_port() -> u16 {
        5672
    }
    pub fn vhost() -> String {
        "/".to_string()
    }
    pub fn user() -> String {
        "guest".to_string()
    }
    pub fn password() -> String {
        "guest".to_string()
    }
    pub fn per_client() -> u16 {
        1
    }
    pub fn heartbeat() -> Duration {
        Duration::from_secs(60)
    }
    pub fn max_frame_size() -> u32 {
        1_048_576
    }
    pub fn write_buffer() -> usize {
        8192
    }
    pub fn read_buffer() -> usize {
        65_536
    }
    pub fn consumer_name() -> String {
        "my_consumer".to_string()
    }
    pub fn durable() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{ByteCapacity, ExchangeKind};

    const FULL: &str = r#"{
        "amqpStreamSettings": {
            "host": "rabbit.internal",
            "streamPort": 5553,
            "amqpPort": 5673,
            "vhost": "telemetry",
            "user": "reader",
            "password": "from-document",
            "maxProducersPerClient": 2,
            "maxConsumersPerClient": 4,
            "isTLS": true,
            "requestedHeartbeat": 30,
            "requestedMaxFrameSize": 2097152,
            "writeBuffer": 4096,
            "readBuffer": 32768,
            "noDelay": true,
            "streamOptions": {
                "streamName": "events",
                "maxAge": 7200,
                "maxLengthBytes": "2GB",
                "maxSegmentSizeBytes": 500000000,
                "consumerName": "dashboard"
            },
            "exchanges": [
                { "name": "ex1", "type": "topic" },
                { "name": "ex2", "type": "fanout", "durable": false, "autoDelete": true }
            ],
            "bindings": [
                { "exchangeName": "ex1", "queueName": "events", "routingKey": "orders.*", "noWait": false }
            ]
        }
    }"#;

    #[test]
    fn test_full_document() {
        let cfg = ClientConfig::from_settings(FULL.as_bytes(), &HashMap::new()).unwrap();

        assert_eq!(cfg.host, "rabbit.internal");
        assert_eq!(cfg.stream_port, 5553);
        assert_eq!(cfg.amqp_port, 5673);
        assert_eq!(cfg.vhost, "telemetry");
        assert_eq!(cfg.password, "from-document");
        assert_eq!(cfg.max_consumers_per_client, 4);
        assert!(cfg.tls);
        assert!(cfg.no_delay);
        assert_eq!(cfg.requested_heartbeat, Duration::from_secs(30));

        assert_eq!(cfg.stream.name, "events");
        assert_eq!(cfg.stream.max_age, Duration::from_secs(7200));
        assert_eq!(cfg.stream.max_length_bytes, Some(ByteCapacity::gb(2)));
        assert_eq!(cfg.stream.max_segment_size_bytes, Some(ByteCapacity::mb(500)));
        assert_eq!(cfg.stream.consumer_name, "dashboard");

        assert_eq!(cfg.exchanges.len(), 2);
        assert_eq!(cfg.exchanges[0].kind, ExchangeKind::Topic);
        assert!(cfg.exchanges[0].durable);
        assert!(!cfg.exchanges[1].durable);
        assert!(cfg.exchanges[1].auto_delete);

        assert_eq!(cfg.bindings[0].routing_key, "orders.*");
        assert_eq!(cfg.bindings[0].queue, "events");
    }

    #[test]
    fn test_secret_overrides_document_password() {
        let secrets = HashMap::from([(PASSWORD_SECRET.to_string(), "vault".to_string())]);
        let cfg = ClientConfig::from_settings(FULL.as_bytes(), &secrets).unwrap();
        assert_eq!(cfg.password, "vault");
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let doc = br#"{"amqpStreamSettings": {"streamOptions": {"streamName": "s"}}}"#;
        let cfg = ClientConfig::from_settings(doc, &HashMap::new()).unwrap();

        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.stream_port, 5552);
        assert_eq!(cfg.amqp_port, 5672);
        assert_eq!(cfg.vhost, "/");
        assert_eq!(cfg.user, "guest");
        assert_eq!(cfg.read_buffer, 65_536);
        assert_eq!(cfg.stream.consumer_name, "my_consumer");
        assert!(cfg.exchanges.is_empty());
        assert!(cfg.bindings.is_empty());
    }

    #[test]
    fn test_missing_stream_is_rejected() {
        let doc = br#"{"amqpStreamSettings": {"host": "rabbit"}}"#;
        let err = ClientConfig::from_settings(doc, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ClientError::Settings(_)));
    }

    #[test]
    fn test_bad_byte_capacity_is_rejected() {
        let doc = br#"{"amqpStreamSettings": {"streamOptions": {"streamName": "s", "maxLengthBytes": "lots"}}}"#;
        assert!(ClientConfig::from_settings(doc, &HashMap::new()).is_err());
    }
}
