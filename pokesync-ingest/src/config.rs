//! Ingestion Configuration Module
//!
//! Everything here is resolved once at startup and then threaded through
//! constructors. Environment lookups go through [`IngestConfig::from_lookup`]
//! so tests can supply a map instead of touching the process env.

use crate::constants::{
    DEFAULT_BUS_GROUP_ID, DEFAULT_BUS_MAX_RETRIES, DEFAULT_BUS_RETRY_INTERVAL_SECS,
    DEFAULT_HTTP_ADDR, DEFAULT_POISON_FILE,
};
use crate::jobs::ReprocessConfig;
use pokesync_core::{ConfigError, DEFAULT_UNOWNED_FIELD};
use pokesync_storage::DbConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Payload keys accepted as the "force unowned" marker.
const UNOWNED_FIELDS: [&str; 2] = ["is_unowned", "is_missing"];

// ============================================================================
// BUS CONFIGURATION
// ============================================================================

/// Connection and retry settings for the message bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    /// Bootstrap address(es), comma separated
    pub brokers: String,
    /// Topic to consume
    pub topic: String,
    /// Consumer group
    pub group_id: String,
    /// Sleep after a failed fetch
    pub retry_interval: Duration,
    /// Consecutive fetch failures before the reader is recreated
    pub max_retries: u32,
}

impl BusConfig {
    /// Build a bus configuration with default retry settings.
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            group_id: DEFAULT_BUS_GROUP_ID.to_string(),
            retry_interval: Duration::from_secs(DEFAULT_BUS_RETRY_INTERVAL_SECS),
            max_retries: DEFAULT_BUS_MAX_RETRIES,
        }
    }

    /// Resolve bus settings.
    ///
    /// Environment variables:
    /// - `POKESYNC_BUS_BROKERS` (required)
    /// - `POKESYNC_BUS_TOPIC` (required)
    /// - `POKESYNC_BUS_GROUP_ID` (default: event_group)
    /// - `POKESYNC_BUS_RETRY_INTERVAL_SECS` (default: 3, 0 means default)
    /// - `POKESYNC_BUS_MAX_RETRIES` (default: 5, 0 means default)
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingRequired {
                    field: key.to_string(),
                })
        };

        let mut config = Self::new(required("POKESYNC_BUS_BROKERS")?, required("POKESYNC_BUS_TOPIC")?);

        if let Some(group) = lookup("POKESYNC_BUS_GROUP_ID").filter(|g| !g.trim().is_empty()) {
            config.group_id = group.trim().to_string();
        }

        let retry_secs: u64 = parse_number(lookup, "POKESYNC_BUS_RETRY_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_BUS_RETRY_INTERVAL_SECS);
        config.retry_interval = Duration::from_secs(retry_secs);

        config.max_retries = parse_number(lookup, "POKESYNC_BUS_MAX_RETRIES")?
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BUS_MAX_RETRIES);

        Ok(config)
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Top-level configuration for the ingestion service.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub bus: BusConfig,
    pub db: DbConfig,
    pub reprocess: ReprocessConfig,
    /// Append-only file of documents the handler rejected
    pub poison_file: PathBuf,
    /// Payload key that forces an instance to unowned
    pub unowned_field: String,
    /// Listener for /healthz, /readyz and /metrics
    pub http_addr: SocketAddr,
}

impl IngestConfig {
    /// Create IngestConfig from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create IngestConfig from an arbitrary key lookup.
    ///
    /// Environment variables (beyond the bus, database and reprocessor ones):
    /// - `POKESYNC_POISON_FILE` (default: failed_messages.jsonl)
    /// - `POKESYNC_UNOWNED_FIELD`: `is_unowned` or `is_missing` (default: is_unowned)
    /// - `POKESYNC_HTTP_ADDR`, else `0.0.0.0:$PORT` (default: 0.0.0.0:3004)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bus = BusConfig::from_lookup(&lookup)?;
        let db = DbConfig::from_lookup(&lookup);
        let reprocess = ReprocessConfig::from_lookup(&lookup);

        let poison_file = lookup("POKESYNC_POISON_FILE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POISON_FILE));

        let unowned_field = match lookup("POKESYNC_UNOWNED_FIELD") {
            None => DEFAULT_UNOWNED_FIELD.to_string(),
            Some(raw) => {
                let field = raw.trim().to_lowercase();
                if field.is_empty() {
                    DEFAULT_UNOWNED_FIELD.to_string()
                } else if UNOWNED_FIELDS.contains(&field.as_str()) {
                    field
                } else {
                    return Err(ConfigError::InvalidValue {
                        field: "POKESYNC_UNOWNED_FIELD".to_string(),
                        value: raw,
                        reason: format!("expected one of {}", UNOWNED_FIELDS.join(", ")),
                    });
                }
            }
        };

        let http_addr = resolve_http_addr(&lookup)?;

        Ok(Self {
            bus,
            db,
            reprocess,
            poison_file,
            unowned_field,
            http_addr,
        })
    }
}

fn resolve_http_addr(lookup: &impl Fn(&str) -> Option<String>) -> Result<SocketAddr, ConfigError> {
    let (field, raw) = if let Some(addr) = lookup("POKESYNC_HTTP_ADDR") {
        ("POKESYNC_HTTP_ADDR", addr)
    } else if let Some(port) = lookup("PORT") {
        ("PORT", format!("0.0.0.0:{}", port.trim()))
    } else {
        ("POKESYNC_HTTP_ADDR", DEFAULT_HTTP_ADDR.to_string())
    };

    raw.trim()
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("POKESYNC_BUS_BROKERS", "kafka:9092"),
        ("POKESYNC_BUS_TOPIC", "batchedUpdates"),
    ];

    #[test]
    fn test_defaults_with_required_bus_settings() {
        let config = IngestConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.bus.brokers, "kafka:9092");
        assert_eq!(config.bus.topic, "batchedUpdates");
        assert_eq!(config.bus.group_id, "event_group");
        assert_eq!(config.bus.retry_interval, Duration::from_secs(3));
        assert_eq!(config.bus.max_retries, 5);
        assert_eq!(config.poison_file, PathBuf::from("failed_messages.jsonl"));
        assert_eq!(config.unowned_field, "is_unowned");
        assert_eq!(config.http_addr, "0.0.0.0:3004".parse().unwrap());
        assert_eq!(config.reprocess.interval, Duration::from_secs(300));
    }

    #[test]
    fn test_missing_brokers_is_fatal() {
        let err = IngestConfig::from_lookup(lookup_from(&[("POKESYNC_BUS_TOPIC", "t")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "POKESYNC_BUS_BROKERS".to_string()
            }
        );
    }

    #[test]
    fn test_blank_topic_is_missing() {
        let err = IngestConfig::from_lookup(lookup_from(&[
            ("POKESYNC_BUS_BROKERS", "kafka:9092"),
            ("POKESYNC_BUS_TOPIC", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { field } if field == "POKESYNC_BUS_TOPIC"));
    }

    #[test]
    fn test_zero_retry_settings_fall_back_to_defaults() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POKESYNC_BUS_RETRY_INTERVAL_SECS", "0"));
        pairs.push(("POKESYNC_BUS_MAX_RETRIES", "0"));
        let config = IngestConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.bus.retry_interval, Duration::from_secs(3));
        assert_eq!(config.bus.max_retries, 5);
    }

    #[test]
    fn test_invalid_retry_interval_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POKESYNC_BUS_RETRY_INTERVAL_SECS", "soon"));
        let err = IngestConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "POKESYNC_BUS_RETRY_INTERVAL_SECS"));
    }

    #[test]
    fn test_unowned_field_override() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POKESYNC_UNOWNED_FIELD", "IS_MISSING"));
        let config = IngestConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.unowned_field, "is_missing");

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POKESYNC_UNOWNED_FIELD", "is_gone"));
        assert!(IngestConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_port_fallback_for_http_addr() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "8080"));
        let config = IngestConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:8080".parse().unwrap());

        pairs.push(("POKESYNC_HTTP_ADDR", "127.0.0.1:9000"));
        let config = IngestConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = IngestConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "PORT"));
    }
}
