//! Runtime configuration, read from `AGENDA_*` environment variables.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_SERVICE_INTERVAL: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// JSON snapshot to load on startup (`AGENDA_SNAPSHOT`).
    pub snapshot: Option<PathBuf>,
    /// Prometheus exporter port (`AGENDA_METRICS_PORT`); disabled when unset.
    pub metrics_port: Option<u16>,
    /// Step used when a snapshot does not set one
    /// (`AGENDA_DEFAULT_SERVICE_INTERVAL`).
    pub default_service_interval: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot: None,
            metrics_port: None,
            default_service_interval: DEFAULT_SERVICE_INTERVAL,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let metrics_port = lookup("AGENDA_METRICS_PORT")
            .map(|p| {
                p.trim()
                    .parse::<u16>()
                    .map_err(|_| ConfigError::Invalid(format!("AGENDA_METRICS_PORT={p}")))
            })
            .transpose()?;

        let default_service_interval = match lookup("AGENDA_DEFAULT_SERVICE_INTERVAL") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(step) if step > 0 => step,
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "AGENDA_DEFAULT_SERVICE_INTERVAL={raw}: expected a positive number of minutes"
                    )));
                }
            },
            None => DEFAULT_SERVICE_INTERVAL,
        };

        Ok(Config {
            snapshot: lookup("AGENDA_SNAPSHOT")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            metrics_port,
            default_service_interval,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
