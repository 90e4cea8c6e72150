// SPDX-License-Identifier: Apache-2.0

//! Database executors behind the [`SqlExecutor`] seam.

mod postgres;
mod postgres_utils;
mod unconfigured;

use std::sync::Arc;

use sqlgate_core::SqlExecutor;

use crate::config::Config;

pub use postgres::PostgresExecutor;
pub use unconfigured::UnconfiguredExecutor;

/// Picks the executor for the loaded configuration.
///
/// Incomplete database settings disable the SQL subsystem only; the
/// returned executor then fails every call with a connection error.
pub fn build_executor(config: &Config) -> Arc<dyn SqlExecutor> {
    match &config.database {
        Ok(database) => Arc::new(PostgresExecutor::connect_lazy(database)),
        Err(err) => {
            tracing::warn!(error = %err, "SQL execution disabled");
            Arc::new(UnconfiguredExecutor::new(err.to_string()))
        }
    }
}
