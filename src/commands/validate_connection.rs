// SPDX-License-Identifier: Apache-2.0

use tracing::{error, info, Instrument};

use crate::commands::{close_session, AppContext};
use crate::engine::EngineError;
use crate::error::PipelineResult;
use crate::pipeline::{build_session, test_session};

async fn validate(ctx: &AppContext) -> PipelineResult<()> {
    let session = build_session(&ctx.registry, &ctx.params).await?;
    let ok = test_session(&session).await;
    close_session(session).await;

    if ok {
        info!("Warehouse connection validated successfully.");
        Ok(())
    } else {
        error!("Warehouse connection validation failed.");
        Err(EngineError::connection_failed("connection test query failed").into())
    }
}

/// Opens a session and runs the connection test query
///
/// Session construction errors are returned as is; a failed test query
/// becomes a connection error so the process exits non-zero.
pub async fn run(ctx: &AppContext) -> PipelineResult<()> {
    validate(ctx)
        .instrument(ctx.logger.stage("validate_connection"))
        .await
}
