// SPDX-License-Identifier: Apache-2.0

//! Pipeline-level error types
//!
//! Every stage returns [`PipelineError`], which separates configuration
//! problems (nothing was sent to the warehouse) from remote failures.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid { message: msg.into() }
    }
}

/// Error returned by every pipeline stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Remote(#[from] EngineError),
}

impl PipelineError {
    /// Short label used when logging which kind of failure ended a stage
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::Remote(_) => "remote",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
