// SPDX-License-Identifier: Apache-2.0

//! Configuration loading
//!
//! Two JSON files drive every stage:
//! - the connection file (`snowflake_connection.json`), passed to the driver
//!   as opaque [`ConnectionParams`];
//! - the pipeline config (`config.json`) with the `logging` and `pipeline`
//!   sections.

pub mod logging;
pub mod pipeline;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::engine::ConnectionParams;
use crate::error::ConfigError;

pub use logging::LoggingConfig;
pub use pipeline::{PipelineConfig, TableDeclaration, WarehouseSize};

pub const DEFAULT_CONNECTION_FILE: &str = "snowflake_connection.json";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const CONNECTION_FILE_ENV: &str = "POS_PIPELINE_CONNECTION_FILE";
pub const CONFIG_FILE_ENV: &str = "POS_PIPELINE_CONFIG_FILE";

/// Contents of `config.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Loads and validates the pipeline config
    ///
    /// A missing file yields defaults unless `required` is set, which is the
    /// case when the path was given explicitly.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let config: AppConfig = match read_json(path) {
            Ok(config) => config,
            Err(ConfigError::NotFound { .. }) if !required => AppConfig::default(),
            Err(e) => return Err(e),
        };
        config.pipeline.validate()?;
        Ok(config)
    }
}

/// Where the two config files are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub connection: PathBuf,
    pub config: PathBuf,
    /// Whether `config` came from the environment rather than the default
    pub config_explicit: bool,
}

impl ConfigPaths {
    /// Defaults in the working directory, overridable through
    /// `POS_PIPELINE_CONNECTION_FILE` and `POS_PIPELINE_CONFIG_FILE`
    pub fn from_env() -> Self {
        let connection = std::env::var_os(CONNECTION_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONNECTION_FILE));
        let explicit_config = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);

        Self {
            connection,
            config_explicit: explicit_config.is_some(),
            config: explicit_config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        }
    }
}

/// Reads the connection file; it must hold a JSON object
pub fn load_connection_params(path: &Path) -> Result<ConnectionParams, ConfigError> {
    let value: serde_json::Value = read_json(path)?;
    match value {
        serde_json::Value::Object(map) => Ok(ConnectionParams::new(map)),
        _ => Err(ConfigError::invalid(format!(
            "{} must contain a JSON object",
            path.display()
        ))),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
