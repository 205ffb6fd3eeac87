// SPDX-License-Identifier: Apache-2.0

//! Builds the flattened POS view and its change stream, then shows a sample.

use std::process::ExitCode;

use pos_pipeline::commands::{self, AppContext};
use pos_pipeline::config::ConfigPaths;

const COMMAND: &str = "create_pos_view";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let ctx = match AppContext::bootstrap(&ConfigPaths::from_env()) {
        Ok(ctx) => ctx,
        Err(e) => return commands::startup_failed(COMMAND, &e),
    };

    let result = commands::create_pos_view::run(&ctx).await.map(|_| ());
    commands::finish(COMMAND, result)
}
