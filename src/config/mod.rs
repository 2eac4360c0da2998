//! Per-device settings records and their resolved form.
//!
//! Each robot has its own record with three sections: `device` (identity),
//! `mqtt` (broker endpoint and credentials) and `log` (log destination).

mod source;

pub use source::{ConfigSource, DeviceDir, DiscoveredConfig};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::defaults;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not parse device record: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("device id is empty")]
    MissingId,
    #[error("device {0} has no broker host")]
    MissingHost(String),
    #[error("device {0} has auth enabled but no username/password")]
    MissingCredentials(String),
    #[error("unknown log level {0}")]
    InvalidLogLevel(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DeviceRecord {
    pub device: DeviceSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DeviceSection {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MqttSection {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub alive: u64,
    #[serde(default)]
    pub auth: bool,
    pub user: Option<String>,
    pub pass: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LogSection {
    pub path: PathBuf,
    #[serde(default)]
    pub level: Option<LogLevel>,
}

impl Default for LogSection {
    fn default() -> Self {
        LogSection {
            path: PathBuf::from(defaults::LOG_DIR),
            level: None,
        }
    }
}

/// Log verbosity as written in a record: a level name, or a numeric
/// threshold where 10 is debug, 20 info, 30 warning and 40 error.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LogLevel {
    Numeric(u64),
    Named(String),
}

impl LogLevel {
    pub fn to_filter(&self) -> Option<LevelFilter> {
        match self {
            LogLevel::Numeric(0) => Some(LevelFilter::Trace),
            LogLevel::Numeric(1..=10) => Some(LevelFilter::Debug),
            LogLevel::Numeric(11..=20) => Some(LevelFilter::Info),
            LogLevel::Numeric(21..=30) => Some(LevelFilter::Warn),
            LogLevel::Numeric(_) => Some(LevelFilter::Error),
            LogLevel::Named(name) => match name.to_ascii_lowercase().as_str() {
                "warning" => Some(LevelFilter::Warn),
                "critical" | "fatal" => Some(LevelFilter::Error),
                other => LevelFilter::from_str(other).ok(),
            },
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LogLevel::Numeric(n) => write!(f, "{n}"),
            LogLevel::Named(name) => f.write_str(name),
        }
    }
}

fn default_port() -> u16 {
    defaults::MQTT_PORT
}

fn default_keep_alive() -> u64 {
    defaults::MQTT_KEEP_ALIVE_SECS
}

/// Resolved settings for one device. Immutable once loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub auth_enabled: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub log_dir: PathBuf,
    /// Fallback log filter when LOG_LEVEL is not set
    pub log_level: Option<LevelFilter>,
}

impl DeviceConfig {
    /// Config with default port, keep-alive and log dir, and auth disabled
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        DeviceConfig {
            id: id.into(),
            host: host.into(),
            port: defaults::MQTT_PORT,
            keep_alive: Duration::from_secs(defaults::MQTT_KEEP_ALIVE_SECS),
            auth_enabled: false,
            username: None,
            password: None,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            log_level: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_enabled = true;
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::MissingId);
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost(self.id.clone()));
        }
        if self.auth_enabled && (self.username.is_none() || self.password.is_none()) {
            return Err(ConfigError::MissingCredentials(self.id.clone()));
        }
        Ok(())
    }

    /// Username and password, only when auth is enabled
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if !self.auth_enabled {
            return None;
        }
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<DeviceRecord> for DeviceConfig {
    type Error = ConfigError;

    fn try_from(record: DeviceRecord) -> Result<Self, Self::Error> {
        let log_level = match &record.log.level {
            Some(level) => Some(
                level
                    .to_filter()
                    .ok_or_else(|| ConfigError::InvalidLogLevel(level.to_string()))?,
            ),
            None => None,
        };

        Ok(DeviceConfig {
            id: record.device.id,
            host: record.mqtt.host,
            port: record.mqtt.port,
            keep_alive: Duration::from_secs(record.mqtt.alive),
            auth_enabled: record.mqtt.auth,
            username: record.mqtt.user,
            password: record.mqtt.pass,
            log_dir: record.log.path,
            log_level,
        })
    }
}

/// Parse a single device record. Does not validate it.
pub fn from_str(config_raw: &str) -> Result<DeviceConfig, ConfigError> {
    let record = serde_json::from_str::<DeviceRecord>(config_raw)?;
    DeviceConfig::try_from(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_record() {
        let config = from_str(
            r#"{
                "device": {"id": "Kerel1"},
                "mqtt": {"host": "broker.local", "port": 1884, "alive": 30,
                         "auth": true, "user": "admin", "pass": "secret"},
                "log": {"path": "/var/log/iotr"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.id, "Kerel1");
        assert_eq!(config.endpoint(), "broker.local:1884");
        assert_eq!(config.keep_alive, Duration::from_secs(30));
        assert_eq!(config.credentials(), Some(("admin", "secret")));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/iotr"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let config =
            from_str(r#"{"device": {"id": "Kerel2"}, "mqtt": {"host": "localhost"}}"#).unwrap();

        assert_eq!(config.port, 1883);
        assert_eq!(config.keep_alive, Duration::from_secs(60));
        assert!(!config.auth_enabled);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn credentials_ignored_without_auth() {
        let mut config = DeviceConfig::new("Kerel1", "localhost");
        config.username = Some("admin".into());
        config.password = Some("admin".into());
        assert_eq!(config.credentials(), None);
    }

    #[test]
    fn validation_errors() {
        assert!(matches!(
            DeviceConfig::new("", "localhost").validate(),
            Err(ConfigError::MissingId)
        ));
        assert!(matches!(
            DeviceConfig::new("Kerel1", " ").validate(),
            Err(ConfigError::MissingHost(id)) if id == "Kerel1"
        ));

        let mut config = DeviceConfig::new("Kerel1", "localhost");
        config.auth_enabled = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredentials(_))
        ));
    }

    #[test]
    fn log_level_names_and_numbers() {
        let parse = |level: &str| {
            from_str(&format!(
                r#"{{"device": {{"id": "Kerel1"}}, "mqtt": {{"host": "localhost"}},
                    "log": {{"path": "logs", "level": {level}}}}}"#
            ))
        };

        assert_eq!(parse("10").unwrap().log_level, Some(LevelFilter::Debug));
        assert_eq!(parse("20").unwrap().log_level, Some(LevelFilter::Info));
        assert_eq!(parse("40").unwrap().log_level, Some(LevelFilter::Error));
        assert_eq!(parse(r#""warning""#).unwrap().log_level, Some(LevelFilter::Warn));
        assert_eq!(parse(r#""TRACE""#).unwrap().log_level, Some(LevelFilter::Trace));
        assert!(matches!(
            parse(r#""chatty""#),
            Err(ConfigError::InvalidLogLevel(level)) if level == "chatty"
        ));
    }

    #[test]
    fn bad_json_is_parse_error() {
        assert!(matches!(from_str("blah"), Err(ConfigError::ParseJson(_))));
    }
}
