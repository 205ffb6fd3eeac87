// SPDX-License-Identifier: Apache-2.0

//! `logging` section of `config.json`

use serde::{Deserialize, Deserializer, Serialize};
use tracing::Level;

/// Recognized logging options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Severity name; INFO when absent or unrecognized
    #[serde(deserialize_with = "severity_name")]
    pub level: Option<String>,
    /// Whether records also reach the root (file) handler
    pub propagate: bool,
}

impl LoggingConfig {
    pub fn level(&self) -> Level {
        self.level
            .as_deref()
            .map(|name| parse_log_level(name, Level::INFO))
            .unwrap_or(Level::INFO)
    }
}

/// Keeps string values only; any other JSON type counts as unrecognized
fn severity_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(name) => Some(name),
        _ => None,
    })
}

/// Maps a severity name to a tracing level, falling back to `default`
///
/// Accepts the usual names case-insensitively, including `WARNING`,
/// `CRITICAL`/`FATAL` (mapped to ERROR) and `NOTSET` (everything, TRACE).
pub fn parse_log_level(name: &str, default: Level) -> Level {
    match name.trim().to_ascii_uppercase().as_str() {
        "NOTSET" | "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" | "CRITICAL" | "FATAL" => Level::ERROR,
        _ => default,
    }
}
