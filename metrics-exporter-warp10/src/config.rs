use std::env::{self, VarError};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable holding the JSON configuration of the exporter.
pub const CONFIG_ENV_VAR: &str = "WARP10_METRICS";

/// Errors that could occur while reading the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed configuration: {reason}")]
    Malformed { reason: String },

    #[error("address is empty")]
    EmptyAddress,

    #[error("token is empty")]
    EmptyToken,
}

/// Where and how to push metrics.
///
/// Read from JSON, for example:
///
/// ```json
/// {"address": "https://warp10.example.com/api/v0/update", "token": "WRITE", "prefix": "acme"}
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Warp10Config {
    /// URL the series are `POST`ed to.
    pub address: String,
    /// Write token.
    pub token: String,
    /// Prefix of every series name, completed with the application name.
    pub prefix: String,
}

impl Warp10Config {
    /// Parses and validates a JSON configuration.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ConfigError::Malformed { reason: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from [`CONFIG_ENV_VAR`].
    ///
    /// Returns `Ok(None)` when the variable is not set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(raw) => Self::from_json(&raw).map(Some),
            Err(VarError::NotPresent) => Ok(None),
            Err(e @ VarError::NotUnicode(_)) => {
                Err(ConfigError::Malformed { reason: e.to_string() })
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        Ok(())
    }

    /// Prefix of the series of `application`.
    pub fn prefix_for(&self, application: &str) -> String {
        match (self.prefix.as_str(), application) {
            ("", application) => application.to_string(),
            (prefix, "") => prefix.to_string(),
            (prefix, application) => format!("{prefix}.{application}"),
        }
    }
}
