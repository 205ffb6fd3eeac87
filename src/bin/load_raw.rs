// SPDX-License-Identifier: Apache-2.0

//! Loads the raw POS and customer tables from the external stage.

use std::process::ExitCode;

use pos_pipeline::commands::{self, AppContext};
use pos_pipeline::config::ConfigPaths;

const COMMAND: &str = "load_raw";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let ctx = match AppContext::bootstrap(&ConfigPaths::from_env()) {
        Ok(ctx) => ctx,
        Err(e) => return commands::startup_failed(COMMAND, &e),
    };

    let result = commands::load_raw::run(&ctx).await.map(|_| ());
    commands::finish(COMMAND, result)
}
