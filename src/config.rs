//! # Configuration
//!
//! Settings for one bridge service and the logging it emits.
//!
//! Values come from TOML (`from_file`, `from_toml`), from `PACKET_BRIDGE_*`
//! environment variables (`from_env`), or from code through
//! `default_with_overrides`. Missing TOML sections and keys fall back to
//! their defaults.
//!
//! ```toml
//! [service]
//! name = "lobby"
//! max_payload_size = 65536
//!
//! [logging]
//! log_level = "debug"
//! json_format = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{BridgeError, Result};

/// Default limit on a single raw payload (16 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Largest payload limit validation accepts
const PAYLOAD_SIZE_CEILING: usize = 256 * 1024 * 1024;

/// Longest accepted service or application name
const MAX_NAME_LEN: usize = 64;

pub const DEFAULT_SERVICE_NAME: &str = "bridge";

const ENV_SERVICE_NAME: &str = "PACKET_BRIDGE_SERVICE_NAME";
const ENV_MAX_PAYLOAD_SIZE: &str = "PACKET_BRIDGE_MAX_PAYLOAD_SIZE";
const ENV_LOG_LEVEL: &str = "PACKET_BRIDGE_LOG_LEVEL";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BridgeError::ConfigError(format!("Invalid TOML: {e}")))
    }

    /// Defaults overridden by `PACKET_BRIDGE_*` environment variables.
    ///
    /// A variable that is set but unparsable is an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(name) = env_var(ENV_SERVICE_NAME) {
            config.service.name = name;
        }
        if let Some(size) = env_var(ENV_MAX_PAYLOAD_SIZE) {
            config.service.max_payload_size = size.parse().map_err(|e| {
                BridgeError::ConfigError(format!("{ENV_MAX_PAYLOAD_SIZE}={size:?}: {e}"))
            })?;
        }
        if let Some(level) = env_var(ENV_LOG_LEVEL) {
            config.logging.log_level = level.parse().map_err(|_| {
                BridgeError::ConfigError(format!("{ENV_LOG_LEVEL}={level:?} is not a log level"))
            })?;
        }

        Ok(config)
    }

    /// Defaults with `mutator` applied.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Defaults rendered as TOML, for seeding a config file.
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::ConfigError(format!("Cannot serialize config: {e}")))?;
        std::fs::write(path, text).map_err(|e| {
            BridgeError::ConfigError(format!("Cannot write {}: {e}", path.display()))
        })
    }

    /// Every problem found, empty when the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        self.service
            .validate()
            .into_iter()
            .chain(self.logging.validate())
            .collect()
    }

    /// Like [`validate`](Self::validate), folding all problems into one error.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        Err(BridgeError::ConfigError(format!(
            "{} configuration problem(s): {}",
            errors.len(),
            errors.join("; ")
        )))
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn check_name(what: &str, name: &str, errors: &mut Vec<String>) {
    if name.trim().is_empty() {
        errors.push(format!("{what} cannot be empty"));
    } else if name.len() > MAX_NAME_LEN {
        errors.push(format!(
            "{what} too long: {} characters (maximum: {MAX_NAME_LEN})",
            name.len()
        ));
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name reported in logs and failure contexts
    pub name: String,

    /// Largest raw payload accepted for decode, in bytes
    pub max_payload_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_owned(),
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_name("Service name", &self.name, &mut errors);

        match self.max_payload_size {
            0 => errors.push("Max payload size cannot be 0".to_owned()),
            size if size > PAYLOAD_SIZE_CEILING => errors.push(format!(
                "Max payload size too large: {size} bytes (maximum: {PAYLOAD_SIZE_CEILING})"
            )),
            _ => {}
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Reported once when logging starts
    pub app_name: String,

    /// Filter used when `RUST_LOG` is unset
    #[serde(with = "level_name")]
    pub log_level: Level,

    pub log_to_console: bool,

    pub log_to_file: bool,

    /// Appended to, created if missing; required when `log_to_file` is set
    pub log_file_path: Option<PathBuf>,

    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: env!("CARGO_PKG_NAME").to_owned(),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_name("Application name", &self.app_name, &mut errors);

        match (self.log_to_console, self.log_to_file, &self.log_file_path) {
            (false, false, _) => {
                errors.push("At least one logging output (console or file) must be enabled".to_owned())
            }
            (_, true, None) => {
                errors.push("log_file_path must be specified when log_to_file is true".to_owned())
            }
            (_, true, Some(path)) => {
                let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
                if let Some(dir) = dir.filter(|dir| !dir.is_dir()) {
                    errors.push(format!("Log directory does not exist: {}", dir.display()));
                }
            }
            _ => {}
        }
        errors
    }
}

/// `tracing::Level` as its lowercase name.
mod level_name {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown log level {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.service.max_payload_size, MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = BridgeConfig::from_toml(
            r#"
            [service]
            max_payload_size = 4096

            [logging]
            log_level = "warn"
            "#,
        )
        .unwrap();
        assert_eq!(config.service.name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.service.max_payload_size, 4096);
        assert_eq!(config.logging.log_level, Level::WARN);
        assert!(config.logging.log_to_console);
    }

    #[test]
    fn test_level_names_roundtrip() {
        let logging = BridgeConfig::default_with_overrides(|c| c.logging.log_level = Level::TRACE)
            .logging;
        let rendered = toml::to_string(&logging).unwrap();
        assert!(rendered.contains("log_level = \"trace\""));
    }
}
