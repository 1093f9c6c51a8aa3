//! Configuration management for the detection pipeline

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "0.0.0.0:8080"
    pub bind_addr: String,
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Header carrying the hex HMAC-SHA256 of the raw body
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    /// Shared secret for the active provider
    pub secret: String,
}

fn default_signature_header() -> String {
    "X-Bank-Signature".to_string()
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path to the persisted model bundle
    pub path: String,
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Gambling-confidence threshold for generating alerts
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    /// Payee patterns seeded into the whitelist at startup
    #[serde(default)]
    pub whitelist: Vec<String>,
}

fn default_alert_threshold() -> f64 {
    0.5
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Overall handler budget in milliseconds; elapsed maps to HTTP 500
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Alert publishing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// NATS server URL; publishing is disabled when absent
    #[serde(default)]
    pub nats_url: Option<String>,
    /// Subject intervention records are published to
    #[serde(default = "default_alert_subject")]
    pub subject: String,
}

fn default_alert_subject() -> String {
    "interventions".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:8080".to_string(),
            },
            webhook: WebhookConfig {
                signature_header: default_signature_header(),
                secret: String::new(),
            },
            model: ModelConfig {
                path: "models/gambling_model.json".to_string(),
            },
            detection: DetectionConfig {
                alert_threshold: default_alert_threshold(),
                whitelist: Vec::new(),
            },
            pipeline: PipelineConfig {
                timeout_ms: default_timeout_ms(),
            },
            alerts: AlertsConfig {
                nats_url: None,
                subject: default_alert_subject(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.webhook.signature_header, "X-Bank-Signature");
        assert_eq!(config.detection.alert_threshold, 0.5);
        assert_eq!(config.pipeline.timeout_ms, 5000);
        assert!(config.alerts.nats_url.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind_addr = "127.0.0.1:9090"

[webhook]
secret = "test-secret"

[model]
path = "models/m.json"

[detection]
alert_threshold = 0.7
whitelist = ["Woolworths", "Coles"]

[pipeline]
timeout_ms = 2000

[alerts]
subject = "alerts.test"

[logging]
level = "debug"
format = "pretty"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.webhook.secret, "test-secret");
        assert_eq!(config.detection.alert_threshold, 0.7);
        assert_eq!(config.detection.whitelist.len(), 2);
        assert_eq!(config.pipeline.timeout_ms, 2000);
        assert_eq!(config.alerts.subject, "alerts.test");
    }
}
