//! Configuration for the tracing engine
//!
//! YAML configuration with environment variable expansion and validation,
//! covering the built-in adapters and the instrumented HTTP client.
//!
//! ```yaml
//! log:
//!   enabled: true
//! prometheus:
//!   enabled: true
//! http:
//!   span_kind: client
//!   timeout_seconds: 30
//!   capture:
//!     response_body: false
//!     max_body_len: 4096
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::adapters::LogAdapterConfig;
#[cfg(feature = "metrics")]
use crate::adapters::PrometheusAdapterConfig;
use crate::http::HttpClientConfig;

/// Expand environment variables in a string.
///
/// Supports `${VAR_NAME}` (placeholder kept when the variable is unset) and
/// `${VAR_NAME:-default}`. Variable names are uppercase letters, digits and
/// underscores, starting with a letter or underscore.
fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let full_match = cap.get(0).unwrap();
        let var_name = cap.get(1).unwrap().as_str();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }
    result.push_str(&s[last_match..]);
    result
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracekitConfig {
    #[serde(default)]
    pub log: LogAdapterConfig,
    #[cfg(feature = "metrics")]
    #[serde(default)]
    pub prometheus: PrometheusAdapterConfig,
    #[serde(default)]
    pub http: HttpClientConfig,
}

impl TracekitConfig {
    /// Load configuration from a YAML file, expanding `${VAR}` references
    /// before parsing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&raw);
        let config: TracekitConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.capture.max_body_len == 0 {
            return Err(ConfigError::ValidationError(
                "http.capture.max_body_len must be greater than zero".into(),
            ));
        }
        if self.http.timeout_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "http.timeout_seconds must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }
}
