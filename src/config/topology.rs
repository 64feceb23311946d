use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::config::settings::{defaults, duration_secs};

/// Stream descriptor: name and retention policy of the stream log.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    /// Stream name.
    #[serde(rename = "streamName")]
    pub name: String,
    /// Maximum age of retained messages (`0s` = unlimited; seconds in the settings document).
    #[serde(default, with = "duration_secs")]
    pub max_age: Duration,
    /// Maximum total retained bytes.
    #[serde(default)]
    pub max_length_bytes: Option<ByteCapacity>,
    /// Maximum size of one segment file.
    #[serde(default)]
    pub max_segment_size_bytes: Option<ByteCapacity>,
    /// Name given to every consumer created on this stream.
    #[serde(default = "defaults::consumer_name")]
    pub consumer_name: String,
}

impl StreamConfig {
    /// Stream with no retention limits and the default consumer name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_age: Duration::ZERO,
            max_length_bytes: None,
            max_segment_size_bytes: None,
            consumer_name: defaults::consumer_name(),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_max_length(mut self, bytes: ByteCapacity) -> Self {
        self.max_length_bytes = Some(bytes);
        self
    }

    pub fn with_max_segment_size(mut self, bytes: ByteCapacity) -> Self {
        self.max_segment_size_bytes = Some(bytes);
        self
    }

    /// Returns the age limit as an `Option` (`None` = unlimited).
    #[inline]
    pub fn age_limit(&self) -> Option<Duration> {
        if self.max_age == Duration::ZERO {
            None
        } else {
            Some(self.max_age)
        }
    }
}

/// Exchange routing type.
///
/// Unknown names are kept as [`ExchangeKind::Custom`] (e.g. plugin exchanges
/// such as `x-consistent-hash`).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
    Custom(String),
}

impl ExchangeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Custom(kind) => kind,
        }
    }
}

impl From<String> for ExchangeKind {
    fn from(kind: String) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            _ => ExchangeKind::Custom(kind),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeConfig {
    /// Exchange name.
    pub name: String,
    /// Routing type.
    #[serde(rename = "type")]
    pub kind: ExchangeKind,
    /// Survives broker restarts.
    #[serde(default = "defaults::durable")]
    pub durable: bool,
    /// Deleted when the last binding is removed.
    #[serde(default)]
    pub auto_delete: bool,
    /// Only reachable from other exchanges.
    #[serde(default)]
    pub internal: bool,
    /// Do not wait for the broker's confirmation.
    #[serde(default)]
    pub no_wait: bool,
}

impl ExchangeConfig {
    /// Durable, non-internal exchange of the given kind.
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: defaults::durable(),
            auto_delete: false,
            internal: false,
            no_wait: false,
        }
    }
}

/// Binding descriptor: routes messages from `exchange` into `queue` by `routing_key`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingConfig {
    /// Source exchange.
    #[serde(rename = "exchangeName")]
    pub exchange: String,
    /// Destination queue or stream.
    #[serde(rename = "queueName")]
    pub queue: String,
    /// Routing key (pattern for topic exchanges).
    #[serde(default)]
    pub routing_key: String,
    /// Do not wait for the broker's confirmation.
    #[serde(default)]
    pub no_wait: bool,
}

impl BindingConfig {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
            no_wait: false,
        }
    }
}

/// A byte count used by stream retention settings.
///
/// Parses plain numbers or a number with a decimal unit suffix
/// (`b`, `kb`, `mb`, `gb`, `tb`; case-insensitive, 1 kb = 1000 bytes).
///
/// # Example
/// ```
/// use amqpstream::ByteCapacity;
///
/// let cap: ByteCapacity = "2GB".parse().unwrap();
/// assert_eq!(cap.bytes(), 2_000_000_000);
/// assert_eq!(ByteCapacity::mb(5).bytes(), 5_000_000);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteCapacity(u64);

impl ByteCapacity {
    pub const fn b(n: u64) -> Self {
        Self(n)
    }
    pub const fn kb(n: u64) -> Self {
        Self(n.saturating_mul(1_000))
    }
    pub const fn mb(n: u64) -> Self {
        Self(n.saturating_mul(1_000_000))
    }
    pub const fn gb(n: u64) -> Self {
        Self(n.saturating_mul(1_000_000_000))
    }
    pub const fn tb(n: u64) -> Self {
        Self(n.saturating_mul(1_000_000_000_000))
    }

    /// Size in bytes.
    pub const fn bytes(&self) -> u64 {
        self.0
    }
}

impl FromStr for ByteCapacity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid byte capacity '{s}'"))?;

        let scale: u64 = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "kb" => 1_000,
            "mb" => 1_000_000,
            "gb" => 1_000_000_000,
            "tb" => 1_000_000_000_000,
            other => return Err(format!("unknown byte capacity unit '{other}' in '{s}'")),
        };
        n.checked_mul(scale)
            .map(Self)
            .ok_or_else(|| format!("byte capacity '{s}' overflows 64 bits"))
    }
}

impl<'de> Deserialize<'de> for ByteCapacity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(n) => Ok(ByteCapacity(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl fmt::Display for ByteCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_capacity_units() {
        assert_eq!("100".parse::<ByteCapacity>().unwrap().bytes(), 100);
        assert_eq!("7kb".parse::<ByteCapacity>().unwrap().bytes(), 7_000);
        assert_eq!("3 MB".parse::<ByteCapacity>().unwrap().bytes(), 3_000_000);
        assert_eq!(
            "1tb".parse::<ByteCapacity>().unwrap(),
            ByteCapacity::tb(1)
        );
        assert!("ten".parse::<ByteCapacity>().is_err());
        assert!("10pb".parse::<ByteCapacity>().is_err());
    }

    #[test]
    fn test_byte_capacity_rejects_overflow() {
        let err = "99999999999TB".parse::<ByteCapacity>().unwrap_err();
        assert!(err.contains("overflows"));
        assert_eq!(
            "18446744073709551615".parse::<ByteCapacity>().unwrap().bytes(),
            u64::MAX
        );
    }

    #[test]
    fn test_exchange_kind_from_name() {
        assert_eq!(ExchangeKind::from("Topic".to_string()), ExchangeKind::Topic);
        assert_eq!(
            ExchangeKind::from("x-consistent-hash".to_string()),
            ExchangeKind::Custom("x-consistent-hash".into())
        );
        assert_eq!(ExchangeKind::Fanout.to_string(), "fanout");
    }

    #[test]
    fn test_stream_age_limit_sentinel() {
        let stream = StreamConfig::new("events");
        assert_eq!(stream.age_limit(), None);
        let stream = stream.with_max_age(Duration::from_secs(3600));
        assert_eq!(stream.age_limit(), Some(Duration::from_secs(3600)));
    }
}
