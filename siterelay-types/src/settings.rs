//! Tolerant configuration reader shared by both units.
//!
//! Values come from an optional TOML file layered under the process
//! environment (environment wins). Keys are lower-case; the matching
//! environment variable is the upper-case form, e.g. `broker_url` is read
//! from `BROKER_URL`.
//!
//! Nothing here fails. A missing or blank value falls back to its default
//! with an info line, an invalid one with a warning, and an unreadable file
//! is logged and skipped.

use std::path::Path;

use config::{Config, Environment, File};
use tracing::{info, warn};

/// Read-only view over the loaded configuration sources.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    config: Config,
}

impl Settings {
    /// Load the optional file at `path` and the process environment.
    pub fn load(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            let layered = Config::builder()
                .add_source(File::from(path).required(false))
                .add_source(Environment::default())
                .build();

            match layered {
                Ok(config) => return Self { config },
                Err(e) => warn!(
                    "Ignoring unreadable config file {}: {}",
                    path.display(),
                    e
                ),
            }
        }

        match Config::builder().add_source(Environment::default()).build() {
            Ok(config) => Self { config },
            Err(e) => {
                warn!("Failed to read environment configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Wrap an already-built [`Config`].
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// A string value, or `default` when missing or blank.
    pub fn string_or(&self, key: &str, default: &str) -> String {
        match self.raw(key) {
            Some(value) => value,
            None => {
                info!("Missing setting {}; using default {}", key, default);
                default.to_string()
            }
        }
    }

    /// A UDP/TCP port, or `default` when missing, unparsable or zero.
    pub fn port_or(&self, key: &str, default: u16) -> u16 {
        let Some(raw) = self.raw(key) else {
            info!("Missing setting {}; using default {}", key, default);
            return default;
        };

        match raw.parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => {
                warn!("Invalid port '{}' for {}; using default {}", raw, key, default);
                default
            }
        }
    }

    /// A non-negative threshold, or `default` when missing, unparsable or
    /// negative.
    pub fn threshold_or(&self, key: &str, default: u32) -> u32 {
        let Some(raw) = self.raw(key) else {
            info!("Missing threshold {}; using default {}", key, default);
            return default;
        };

        match raw.parse::<i64>() {
            Ok(value) if value < 0 => {
                warn!("Negative threshold '{}' for {}; using default {}", raw, key, default);
                default
            }
            Ok(value) => match u32::try_from(value) {
                Ok(threshold) => threshold,
                Err(_) => {
                    warn!("Threshold '{}' for {} out of range; using default {}", raw, key, default);
                    default
                }
            },
            Err(_) => {
                warn!("Invalid threshold '{}' for {}; using default {}", raw, key, default);
                default
            }
        }
    }

    fn raw(&self, key: &str) -> Option<String> {
        self.config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}
