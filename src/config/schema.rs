//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! default every field so a minimal (even empty) file is valid.

use serde::{Deserialize, Serialize};

use crate::net::ListenOptions;

/// Root configuration for the application server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Where to listen. Same fields as the listen options object.
    pub listen: ListenOptions,

    /// Close behavior.
    pub shutdown: ShutdownConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// Metrics settings.
    pub observability: ObservabilityConfig,
}

/// Close behavior.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long `close` waits for open connections to finish, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "app_listener=info,tower_http=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.shutdown.drain_timeout_secs, 30);
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn full_document() {
        let config: ServerConfig = toml::from_str(
            r#"
            [listen]
            port = 8080
            host = "0.0.0.0"
            backlog = 1024
            ipv6Only = true

            [shutdown]
            drain_timeout_secs = 5

            [logging]
            level = "debug"
            format = "compact"

            [observability]
            metrics_enabled = true
            metrics_address = "0.0.0.0:9100"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen.port, Some(8080));
        assert_eq!(config.listen.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.listen.backlog, Some(1024));
        assert!(config.listen.ipv6_only);
        assert_eq!(config.shutdown.drain_timeout_secs, 5);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.observability.metrics_address, "0.0.0.0:9100");
    }
}
