// SPDX-License-Identifier: Apache-2.0

//! Checks that the configured warehouse connection answers a query.

use std::process::ExitCode;

use pos_pipeline::commands::{self, AppContext};
use pos_pipeline::config::ConfigPaths;

const COMMAND: &str = "validate_connection";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let ctx = match AppContext::bootstrap(&ConfigPaths::from_env()) {
        Ok(ctx) => ctx,
        Err(e) => return commands::startup_failed(COMMAND, &e),
    };

    let result = commands::validate_connection::run(&ctx).await;
    commands::finish(COMMAND, result)
}
