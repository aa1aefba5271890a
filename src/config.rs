//! Configuration system for the station link and broker session
//!
//! One fixed network profile (`[link]`) and one fixed broker profile (`[session]`),
//! loaded once from TOML at startup. There is no runtime reconfiguration.

use crate::link::StationProfile;
use crate::session::topics::{TopicError, TopicSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Placeholder written in place of secrets when a config is displayed
pub const REDACTED: &str = "***";

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationConfig {
    pub link: LinkSection,
    pub session: SessionSection,
}

/// Station link section: network profile and retry policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSection {
    /// Network name (SSID), at most 32 bytes
    pub ssid: String,
    /// Literal passphrase; takes precedence over `passphrase_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    /// Environment variable containing the passphrase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_env: Option<String>,
    /// Weakest authentication mode accepted when selecting an access point
    #[serde(default)]
    pub auth_mode: AuthMode,
    /// WPA3 SAE password element derivation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sae_mode: Option<SaeMode>,
    /// Password identifier used with hash-to-element derivation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sae_h2e_identifier: Option<String>,
    /// Immediate association retries before entering cooldown (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Cooldown before the next association round in seconds (default: 60)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// `host:port` probed by the host link driver; defaults to the broker endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_address: Option<String>,
    /// Interval between reachability probes once associated (default: 10)
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// Bound on a single reachability probe in milliseconds (default: 3000)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Broker session section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Broker URI with scheme and optional port, e.g. `mqtt://broker.local:1883`
    pub broker_url: String,
    /// Client identifier; generated per process when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Environment variable containing the username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Environment variable containing the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    /// Bound on establishing the broker session in milliseconds (default: 10000)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// MQTT keep-alive in seconds (default: 60)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Semicolon separated topic filters subscribed on every session establishment
    #[serde(default)]
    pub topics: String,
}

/// Authentication mode threshold for access point selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    #[default]
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    WapiPsk,
}

impl AuthMode {
    /// Whether this threshold admits networks without a passphrase
    pub fn is_open(&self) -> bool {
        matches!(self, AuthMode::Open)
    }
}

/// WPA3 SAE password element derivation method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaeMode {
    HuntAndPeck,
    HashToElement,
    Both,
}

/// Upper bound on immediate association retries before a cooldown
pub const MAX_RETRIES_LIMIT: u32 = 100;

fn default_max_retries() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_keep_alive_secs() -> u64 {
    60
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid topic list: {0}")]
    InvalidTopic(#[from] TopicError),
}

impl StationConfig {
    /// Load configuration from TOML file with environment variable resolution
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse, resolve secrets and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: StationConfig = toml::from_str(content)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Fill secrets from their `*_env` variables when no literal value was given
    fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if self.link.passphrase.is_none() {
            self.link.passphrase = get_env_var(self.link.passphrase_env.as_deref())?;
        }
        if self.session.username.is_none() {
            self.session.username = get_env_var(self.session.username_env.as_deref())?;
        }
        if self.session.password.is_none() {
            self.session.password = get_env_var(self.session.password_env.as_deref())?;
        }
        Ok(())
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link.validate()?;
        self.session.validate()
    }

    /// Copy of the configuration with every secret replaced by [`REDACTED`]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.link.passphrase.is_some() {
            copy.link.passphrase = Some(REDACTED.to_string());
        }
        if copy.session.password.is_some() {
            copy.session.password = Some(REDACTED.to_string());
        }
        copy
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[link]
ssid = "test-network"
passphrase = "correct-horse"
max_retries = 3
cooldown_secs = 30

[session]
broker_url = "mqtt://localhost:1883"
topics = "sensors/temp;actuators/+/set"
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

/// Read an environment variable named by an optional `*_env` field
fn get_env_var(env_var_name: Option<&str>) -> Result<Option<String>, ConfigError> {
    match env_var_name {
        Some(name) => std::env::var(name)
            .map(Some)
            .map_err(|_| ConfigError::EnvVarNotFound(name.to_string())),
        None => Ok(None),
    }
}

impl LinkSection {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        StationProfile::from_section(self)
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("link: {e}")))?;

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidConfig(format!(
                "link.max_retries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }
        if self.cooldown_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "link.cooldown_secs must be greater than 0".to_string(),
            ));
        }
        if self.probe_interval_secs == 0 || self.probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "link probe interval and timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl SessionSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Parse the configured topic list
    pub fn topic_set(&self) -> Result<TopicSet, ConfigError> {
        Ok(TopicSet::parse(&self.topics)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "session.broker_url must not be empty".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(
                "session.keep_alive_secs must be at least 5".to_string(),
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::InvalidConfig(
                "session.password requires session.username".to_string(),
            ));
        }
        self.topic_set()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[link]
ssid = "plant-floor"
passphrase = "hunter22"
auth_mode = "wpa2_wpa3_psk"
sae_mode = "hash_to_element"
sae_h2e_identifier = "pw-id"
max_retries = 7
cooldown_secs = 120
probe_address = "10.0.0.1:53"

[session]
broker_url = "mqtts://broker.example.com:8883"
client_id = "press-04"
username = "device"
password = "s3cret"
connect_timeout_ms = 4000
keep_alive_secs = 30
topics = "a/b;c/d"
"#;

        let config = StationConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.link.ssid, "plant-floor");
        assert_eq!(config.link.auth_mode, AuthMode::Wpa2Wpa3Psk);
        assert_eq!(config.link.sae_mode, Some(SaeMode::HashToElement));
        assert_eq!(config.link.max_retries, 7);
        assert_eq!(config.link.cooldown(), Duration::from_secs(120));
        assert_eq!(config.session.connect_timeout(), Duration::from_millis(4000));
        assert_eq!(config.session.client_id.as_deref(), Some("press-04"));
        assert_eq!(config.session.topic_set().unwrap().len(), 2);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let toml_content = r#"
[link]
ssid = "home"
passphrase = "password123"

[session]
broker_url = "mqtt://localhost"
"#;

        let config = StationConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.link.auth_mode, AuthMode::Wpa2Psk);
        assert_eq!(config.link.max_retries, 5);
        assert_eq!(config.link.cooldown_secs, 60);
        assert_eq!(config.link.probe_interval_secs, 10);
        assert_eq!(config.session.connect_timeout_ms, 10_000);
        assert_eq!(config.session.keep_alive_secs, 60);
        assert!(config.session.topic_set().unwrap().is_empty());
    }

    #[test]
    fn test_open_network_needs_no_passphrase() {
        let toml_content = r#"
[link]
ssid = "guest"
auth_mode = "open"

[session]
broker_url = "mqtt://localhost"
"#;

        assert!(StationConfig::from_toml_str(toml_content).is_ok());
    }

    #[test]
    fn test_protected_network_requires_passphrase() {
        let toml_content = r#"
[link]
ssid = "office"

[session]
broker_url = "mqtt://localhost"
"#;

        let result = StationConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_ssid_length_limit() {
        let toml_content = format!(
            r#"
[link]
ssid = "{}"
auth_mode = "open"

[session]
broker_url = "mqtt://localhost"
"#,
            "s".repeat(33)
        );

        let result = StationConfig::from_toml_str(&toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_cooldown_rejected() {
        let toml_content = r#"
[link]
ssid = "home"
auth_mode = "open"
cooldown_secs = 0

[session]
broker_url = "mqtt://localhost"
"#;

        let result = StationConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_retry_budget_capped() {
        let section = |max_retries: u32| {
            format!(
                r#"
[link]
ssid = "home"
auth_mode = "open"
max_retries = {max_retries}

[session]
broker_url = "mqtt://localhost"
"#
            )
        };

        let config = StationConfig::from_toml_str(&section(MAX_RETRIES_LIMIT)).unwrap();
        assert_eq!(config.link.max_retries, MAX_RETRIES_LIMIT);

        let result = StationConfig::from_toml_str(&section(MAX_RETRIES_LIMIT + 1));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidConfig(msg)) if msg.contains("max_retries")
        ));
    }

    #[test]
    fn test_short_keep_alive_rejected() {
        let toml_content = r#"
[link]
ssid = "home"
auth_mode = "open"

[session]
broker_url = "mqtt://localhost"
keep_alive_secs = 2
"#;

        let result = StationConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_topic_rejected() {
        let toml_content = r#"
[link]
ssid = "home"
auth_mode = "open"

[session]
broker_url = "mqtt://localhost"
topics = "a/#/b"
"#;

        let result = StationConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidTopic(_))));
    }

    #[test]
    fn test_missing_env_var_is_error() {
        let toml_content = r#"
[link]
ssid = "home"
passphrase_env = "STATIONLINK_TEST_UNSET_PASSPHRASE"

[session]
broker_url = "mqtt://localhost"
"#;

        let result = StationConfig::from_toml_str(toml_content);
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarNotFound(name)) if name == "STATIONLINK_TEST_UNSET_PASSPHRASE"
        ));
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = StationConfig::test_config();
        config.session.username = Some("device".to_string());
        config.session.password = Some("s3cret".to_string());

        let redacted = config.redacted();
        assert_eq!(redacted.link.passphrase.as_deref(), Some(REDACTED));
        assert_eq!(redacted.session.password.as_deref(), Some(REDACTED));
        assert_eq!(redacted.session.username.as_deref(), Some("device"));

        let rendered = toml::to_string_pretty(&redacted).unwrap();
        assert!(!rendered.contains("correct-horse"));
        assert!(!rendered.contains("s3cret"));
    }
}
