// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, info, Instrument};

use crate::commands::{close_session, AppContext};
use crate::engine::error::EngineResult;
use crate::engine::Session;
use crate::error::PipelineResult;
use crate::pipeline::loader::apply_pipeline_context;
use crate::pipeline::view::{self, ViewStats};

async fn build_and_sample(session: &mut Session, ctx: &AppContext) -> EngineResult<Option<ViewStats>> {
    apply_pipeline_context(session, &ctx.config.pipeline)?;

    debug!("Creating POS flattened view and stream");
    view::create_pos_view(session).await?;
    view::create_pos_view_stream(session).await?;

    debug!("Testing POS flattened view");
    let sample = view::test_pos_view(session).await?;
    print!("{}", sample.render_table());

    if !ctx.config.pipeline.verify_view {
        return Ok(None);
    }
    view::check_pos_view(session).await.map(Some)
}

/// Creates the flattened view and its stream, then shows a sample
///
/// Row counts are checked only when `pipeline.verify_view` is set; their
/// result is returned in that case.
pub async fn run(ctx: &AppContext) -> PipelineResult<Option<ViewStats>> {
    let span = ctx.logger.stage("create_pos_view");
    let mut session = ctx.open_session().instrument(span.clone()).await?;

    let outcome = build_and_sample(&mut session, ctx).instrument(span.clone()).await;
    close_session(session).await;

    let stats = outcome?;
    span.in_scope(|| info!("POS flattened view and stream created and tested successfully"));
    Ok(stats)
}
