// SPDX-License-Identifier: Apache-2.0

//! DataEngine trait definition
//!
//! This is the seam between the pipeline stages and the warehouse. Stages
//! only ever talk to a [`Session`](crate::engine::Session), which forwards
//! every statement to the driver behind this trait.

use async_trait::async_trait;

use crate::engine::error::EngineResult;
use crate::engine::types::{ConnectionParams, QueryResult, SessionContext, SessionId};

/// Core trait that all warehouse drivers must implement
#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Returns the unique identifier for this driver (e.g., "snowflake")
    fn driver_id(&self) -> &'static str;

    /// Returns a human-readable name for this driver
    fn driver_name(&self) -> &'static str;

    /// Validates the parameters and opens a session
    ///
    /// Failures here are construction failures and must be surfaced to the
    /// caller as errors.
    async fn connect(&self, params: &ConnectionParams) -> EngineResult<SessionId>;

    /// Closes a session and releases associated resources
    async fn disconnect(&self, session: SessionId) -> EngineResult<()>;

    /// Executes a single SQL statement under the given context
    async fn execute(
        &self,
        session: SessionId,
        context: &SessionContext,
        statement: &str,
    ) -> EngineResult<QueryResult>;
}
