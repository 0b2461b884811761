//! Configuration types for phonelink
//!
//! Defines:
//! - `Settings` - All runtime settings, loaded from `.phonelink/config.toml`
//! - One sub-struct per TOML section

use std::time::Duration;

use phonelink_core::prelude::*;
use phonelink_core::Thresholds;
use serde::{Deserialize, Serialize};
use url::Url;

/// Runtime settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub history: HistorySettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub correlation: CorrelationSettings,
}

impl Settings {
    /// Settings for a given server and device id, everything else default.
    pub fn for_device(server_url: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            connection: ConnectionSettings {
                server_url: server_url.into(),
                device_id: device_id.into(),
            },
            ..Default::default()
        }
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.connection.device_id.trim().is_empty() {
            return Err(Error::config_invalid("connection.device_id must not be empty"));
        }
        self.connection.websocket_url()?;
        if self.history.stream_threshold == 0 || self.history.default_threshold == 0 {
            return Err(Error::config_invalid("history thresholds must be at least 1"));
        }
        if self.correlation.max_queued_per_channel == 0 {
            return Err(Error::config_invalid(
                "correlation.max_queued_per_channel must be at least 1",
            ));
        }
        Ok(())
    }
}

/// `[connection]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Display server address (http, https, ws or wss)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Room/channel name shared with the display
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            device_id: default_device_id(),
        }
    }
}

impl ConnectionSettings {
    /// `server_url` with its scheme mapped onto ws/wss.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)
            .map_err(|e| Error::config_invalid(format!("server_url '{}': {}", self.server_url, e)))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::config_invalid(format!(
                    "unsupported server_url scheme '{other}'"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::config_invalid("cannot rewrite server_url scheme"))?;
        Ok(url)
    }
}

fn default_server_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_device_id() -> String {
    "FooBar".to_string()
}

/// `[history]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistorySettings {
    /// Buffer size for acceleration and gyro
    #[serde(default = "default_stream_threshold")]
    pub stream_threshold: usize,

    /// Buffer size for every other kind
    #[serde(default = "default_threshold")]
    pub default_threshold: usize,

    /// Start with recording on (unbounded buffers)
    #[serde(default)]
    pub record_on_start: bool,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            stream_threshold: default_stream_threshold(),
            default_threshold: default_threshold(),
            record_on_start: false,
        }
    }
}

impl HistorySettings {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            stream: self.stream_threshold,
            default: self.default_threshold,
        }
    }
}

fn default_stream_threshold() -> usize {
    phonelink_core::history::DEFAULT_STREAM_THRESHOLD
}

fn default_threshold() -> usize {
    phonelink_core::history::DEFAULT_THRESHOLD
}

/// `[scheduler]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SchedulerSettings {
    /// Default tick interval for subscriptions
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Shorter requested intervals are raised to this
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl SchedulerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// `requested`, but never below the configured minimum.
    pub fn clamp(&self, requested: Duration) -> Duration {
        requested.max(Duration::from_millis(self.min_interval_ms))
    }
}

fn default_interval_ms() -> u64 {
    50
}

fn default_min_interval_ms() -> u64 {
    1
}

/// `[correlation]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CorrelationSettings {
    /// Give up on a prompt after this long; absent waits forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_timeout_ms: Option<u64>,

    /// Give up on an alert after this long; absent waits forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_timeout_ms: Option<u64>,

    /// Total budget for a device number change, retries included
    #[serde(default = "default_device_nr_timeout_ms")]
    pub device_nr_timeout_ms: u64,

    /// Unclaimed replies kept per channel before the oldest is dropped
    #[serde(default = "default_max_queued")]
    pub max_queued_per_channel: usize,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            prompt_timeout_ms: None,
            alert_timeout_ms: None,
            device_nr_timeout_ms: default_device_nr_timeout_ms(),
            max_queued_per_channel: default_max_queued(),
        }
    }
}

impl CorrelationSettings {
    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_ms.map(Duration::from_millis)
    }

    pub fn alert_timeout(&self) -> Option<Duration> {
        self.alert_timeout_ms.map(Duration::from_millis)
    }

    pub fn device_nr_timeout(&self) -> Duration {
        Duration::from_millis(self.device_nr_timeout_ms)
    }
}

fn default_device_nr_timeout_ms() -> u64 {
    5000
}

fn default_max_queued() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.connection.server_url, "http://localhost:5000");
        assert_eq!(settings.connection.device_id, "FooBar");
        assert_eq!(settings.history.stream_threshold, 120);
        assert_eq!(settings.history.default_threshold, 5);
        assert_eq!(settings.scheduler.interval(), Duration::from_millis(50));
        assert_eq!(settings.correlation.prompt_timeout(), None);
        assert_eq!(settings.correlation.device_nr_timeout(), Duration::from_secs(5));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [connection]
            device_id = "Lab3"

            [correlation]
            prompt_timeout_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(settings.connection.device_id, "Lab3");
        assert_eq!(settings.connection.server_url, "http://localhost:5000");
        assert_eq!(
            settings.correlation.prompt_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(settings.history, HistorySettings::default());
    }

    #[test]
    fn test_websocket_url_scheme_mapping() {
        let mut conn = ConnectionSettings::default();
        assert_eq!(conn.websocket_url().unwrap().as_str(), "ws://localhost:5000/");

        conn.server_url = "https://io.example.org/socket".into();
        assert_eq!(
            conn.websocket_url().unwrap().as_str(),
            "wss://io.example.org/socket"
        );

        conn.server_url = "ftp://example.org".into();
        assert!(matches!(
            conn.websocket_url(),
            Err(Error::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_device_id() {
        let settings = Settings::for_device("http://localhost:5000", " ");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_scheduler_clamp() {
        let scheduler = SchedulerSettings {
            interval_ms: 50,
            min_interval_ms: 10,
        };
        assert_eq!(
            scheduler.clamp(Duration::from_millis(2)),
            Duration::from_millis(10)
        );
        assert_eq!(
            scheduler.clamp(Duration::from_millis(20)),
            Duration::from_millis(20)
        );
    }
}
