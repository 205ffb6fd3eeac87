// SPDX-License-Identifier: Apache-2.0

//! Commands
//!
//! One module per binary. Each `run` takes the bootstrapped [`AppContext`]
//! and returns a [`PipelineResult`]; [`finish`] turns that into the exit code.

pub mod create_pos_view;
pub mod load_raw;
pub mod validate_connection;

use std::process::ExitCode;

use tracing::{debug, error, info, warn};

use crate::config::{load_connection_params, AppConfig, ConfigPaths};
use crate::engine::{ConnectionParams, DriverRegistry, Session};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::observability::PipelineLogger;

/// Everything a command needs, built once per process
pub struct AppContext {
    pub registry: DriverRegistry,
    pub config: AppConfig,
    pub params: ConnectionParams,
    pub logger: PipelineLogger,
}

impl AppContext {
    /// Reads `config.json`, installs logging, then reads the connection file
    pub fn bootstrap(paths: &ConfigPaths) -> PipelineResult<Self> {
        let config = AppConfig::load(&paths.config, paths.config_explicit)?;
        let logger = PipelineLogger::from_config(&config.logging);
        logger.install();

        debug!("Loading warehouse connection params from {}", paths.connection.display());
        let params = load_connection_params(&paths.connection).map_err(|e| {
            error!("Error loading warehouse connection params: {}", e);
            e
        })?;
        debug!(driver = params.driver(), keys = params.len(), "Connection params loaded");

        Ok(Self::new(DriverRegistry::with_defaults(), config, params))
    }

    /// Assembles a context without touching the filesystem or the global
    /// subscriber
    pub fn new(registry: DriverRegistry, config: AppConfig, params: ConnectionParams) -> Self {
        let logger = PipelineLogger::from_config(&config.logging);
        Self {
            registry,
            config,
            params,
            logger,
        }
    }

    pub async fn open_session(&self) -> PipelineResult<Session> {
        let session = Session::connect(&self.registry, &self.params).await?;
        debug!(driver = session.driver_id(), "Warehouse session created");
        Ok(session)
    }
}

/// Closes a session whose work is done; a failed close only warrants a warning
pub(crate) async fn close_session(session: Session) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close warehouse session");
    }
}

/// Reports a failure that happened before logging was installed
pub fn startup_failed(command: &str, err: &PipelineError) -> ExitCode {
    eprintln!("{}: {}", command, err);
    ExitCode::FAILURE
}

/// Logs the outcome with a statement summary and maps it to an exit code
pub fn finish(command: &str, result: PipelineResult<()>) -> ExitCode {
    let stats = metrics::snapshot();
    match result {
        Ok(()) => {
            info!(
                command,
                statements = stats.total,
                failed_statements = stats.failed,
                duration_total_ms = stats.duration_total_ms,
                duration_max_ms = stats.duration_max_ms,
                "Finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                command,
                kind = e.kind(),
                statements = stats.total,
                failed_statements = stats.failed,
                "Failed: {}",
                e
            );
            ExitCode::FAILURE
        }
    }
}
