// SPDX-License-Identifier: Apache-2.0

//! Session
//!
//! A connected warehouse session plus the client-side context (role,
//! warehouse, database, schema) every statement runs under.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::sql::validate_identifier;
use crate::engine::traits::DataEngine;
use crate::engine::types::{ConnectionParams, QueryResult, SessionContext, SessionId};
use crate::engine::DriverRegistry;
use crate::metrics;

pub struct Session {
    engine: Arc<dyn DataEngine>,
    id: SessionId,
    context: SessionContext,
}

impl Session {
    /// Resolves the driver named by the params and opens a session on it
    #[instrument(skip(registry, params), fields(driver = %params.driver()))]
    pub async fn connect(registry: &DriverRegistry, params: &ConnectionParams) -> EngineResult<Self> {
        let engine = registry
            .get(params.driver())
            .ok_or_else(|| EngineError::driver_not_found(params.driver()))?;
        Self::open(engine, params).await
    }

    /// Opens a session on an explicit driver instance
    pub async fn open(engine: Arc<dyn DataEngine>, params: &ConnectionParams) -> EngineResult<Self> {
        let id = engine.connect(params).await?;
        let context = SessionContext::from_params(params);
        debug!(session_id = %id.0, driver = engine.driver_id(), "Session opened");
        Ok(Self {
            engine,
            id,
            context,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn driver_id(&self) -> &'static str {
        self.engine.driver_id()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn use_role(&mut self, role: &str) -> EngineResult<()> {
        self.context.role = Some(validate_identifier(role)?.to_string());
        Ok(())
    }

    pub fn use_warehouse(&mut self, warehouse: &str) -> EngineResult<()> {
        self.context.warehouse = Some(validate_identifier(warehouse)?.to_string());
        Ok(())
    }

    pub fn use_database(&mut self, database: &str) -> EngineResult<()> {
        self.context.database = Some(validate_identifier(database)?.to_string());
        Ok(())
    }

    pub fn use_schema(&mut self, schema: &str) -> EngineResult<()> {
        self.context.schema = Some(validate_identifier(schema)?.to_string());
        Ok(())
    }

    /// Executes one statement and waits for its result
    #[instrument(skip(self, statement), fields(session_id = %self.id.0, schema = ?self.context.schema))]
    pub async fn sql(&self, statement: &str) -> EngineResult<QueryResult> {
        debug!(statement = %statement, "Executing statement");
        let started = Instant::now();
        let result = self.engine.execute(self.id, &self.context, statement).await;
        metrics::record_statement(started.elapsed().as_secs_f64() * 1000.0, result.is_ok());
        result
    }

    /// Closes the session on the driver
    pub async fn close(self) -> EngineResult<()> {
        self.engine.disconnect(self.id).await
    }
}
