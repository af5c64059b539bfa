//! Process configuration, loaded from a TOML file.
//!
//! Every section has serde defaults so a minimal config only needs the
//! tracking base URL; the master key usually arrives through the
//! `COURIER_MASTER_KEY` environment variable rather than the file.

use std::time::Duration;

use courier_content::TrackingConfig;
use courier_dispatch::WorkerConfig;
use courier_transport::TransportTimeouts;
use courier_vault::{MasterKey, VaultError};
use serde::Deserialize;

/// Environment variable holding the hex-encoded master key; overrides the
/// config file when set.
pub const MASTER_KEY_ENV: &str = "COURIER_MASTER_KEY";

const fn default_idle_sleep() -> u64 {
    15
}

const fn default_bounce_poll() -> u64 {
    300
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_housekeep() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourierConfig {
    pub tracking: TrackingSection,

    #[serde(default)]
    pub vault: VaultSection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub transport: TransportTimeouts,
}

impl CourierConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Tracking endpoints base and per-transform toggles.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingSection {
    /// Public base URL the tracking router is mounted on, e.g.
    /// `https://mail.example.org`.
    pub base_url: String,

    #[serde(flatten)]
    pub options: TrackingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultSection {
    /// Hex-encoded 32-byte master key. Prefer `COURIER_MASTER_KEY`.
    #[serde(default)]
    pub master_key_hex: Option<String>,
}

impl VaultSection {
    /// Resolve the master key: environment first, then the config file.
    pub fn master_key(&self) -> Result<MasterKey, VaultError> {
        if let Ok(hex_key) = std::env::var(MASTER_KEY_ENV) {
            return MasterKey::from_hex(&hex_key);
        }

        match &self.master_key_hex {
            Some(hex_key) => MasterKey::from_hex(hex_key),
            None => Err(VaultError::InvalidKey(format!(
                "no master key: set {MASTER_KEY_ENV} or [vault].master_key_hex"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSection {
    /// Pause between worker batches and while the queue is empty (seconds).
    #[serde(default = "default_idle_sleep")]
    pub idle_sleep_secs: u64,

    /// Bounce mailbox poll interval (seconds).
    #[serde(default = "default_bounce_poll")]
    pub bounce_poll_secs: u64,

    /// Send attempts (including the first) before a retryable failure
    /// becomes terminal.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Orchestrator housekeeping interval (seconds).
    #[serde(default = "default_housekeep")]
    pub housekeep_secs: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            idle_sleep_secs: default_idle_sleep(),
            bounce_poll_secs: default_bounce_poll(),
            max_attempts: default_max_attempts(),
            housekeep_secs: default_housekeep(),
        }
    }
}

impl DispatchSection {
    #[must_use]
    pub const fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            idle_sleep: Duration::from_secs(self.idle_sleep_secs),
            bounce_poll_interval: Duration::from_secs(self.bounce_poll_secs),
            max_attempts: self.max_attempts,
        }
    }

    #[must_use]
    pub const fn housekeep_interval(&self) -> Duration {
        Duration::from_secs(self.housekeep_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = CourierConfig::from_toml(
            r#"
            [tracking]
            base_url = "https://mail.example.org"
            "#,
        )
        .unwrap();

        assert_eq!(config.tracking.base_url, "https://mail.example.org");
        assert!(config.tracking.options.include_click_tracking);
        assert!(config.tracking.options.include_open_tracking);
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.dispatch.worker_config().idle_sleep.as_secs(), 15);
        assert_eq!(config.transport.connect_secs, 30);
        assert!(config.vault.master_key_hex.is_none());
    }

    #[test]
    fn full_config_round_trips() {
        let config = CourierConfig::from_toml(
            r#"
            [tracking]
            base_url = "https://t.example"
            include_click_tracking = false

            [vault]
            master_key_hex = "0000000000000000000000000000000000000000000000000000000000000000"

            [dispatch]
            idle_sleep_secs = 5
            bounce_poll_secs = 60
            max_attempts = 5
            housekeep_secs = 30

            [transport]
            connect_secs = 10
            command_secs = 10
            data_secs = 60
            http_secs = 20
            "#,
        )
        .unwrap();

        assert!(!config.tracking.options.include_click_tracking);
        assert!(config.tracking.options.include_unsubscribe);
        assert_eq!(config.dispatch.max_attempts, 5);
        assert_eq!(config.transport.data_secs, 60);
        assert!(config.vault.master_key().is_ok());
    }

    #[test]
    fn missing_master_key_is_an_error() {
        let section = VaultSection::default();
        // Only meaningful when the env var is absent in the test runner.
        if std::env::var(MASTER_KEY_ENV).is_err() {
            assert!(section.master_key().is_err());
        }
    }

    #[test]
    fn short_master_key_is_rejected() {
        let section = VaultSection {
            master_key_hex: Some("deadbeef".to_string()),
        };
        if std::env::var(MASTER_KEY_ENV).is_err() {
            assert!(section.master_key().is_err());
        }
    }

    #[test]
    fn missing_tracking_section_fails_parse() {
        assert!(CourierConfig::from_toml("[dispatch]\nmax_attempts = 2").is_err());
    }
}
