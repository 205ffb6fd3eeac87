// SPDX-License-Identifier: Apache-2.0

use tracing::info;

use crate::commands::{close_session, AppContext};
use crate::error::PipelineResult;
use crate::pipeline::{load_all_raw_tables, LoadReport};

/// Loads every declared raw table
pub async fn run(ctx: &AppContext) -> PipelineResult<LoadReport> {
    let mut session = ctx.open_session().await?;
    let loaded = load_all_raw_tables(&mut session, &ctx.config.pipeline, &ctx.logger).await;
    close_session(session).await;

    let report = loaded?;
    info!(
        tables = ctx.config.pipeline.tables.len(),
        copies = report.copies.len(),
        "Raw load complete"
    );
    Ok(report)
}
