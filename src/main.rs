// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;

use mimalloc::MiMalloc;

use sqlgate_lib::config::Config;
use sqlgate_lib::observability::init_tracing;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let config = Config::from_env();
    let _guard = init_tracing(&config.log);

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }
    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    match sqlgate_lib::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sqlgate failed");
            ExitCode::FAILURE
        }
    }
}
