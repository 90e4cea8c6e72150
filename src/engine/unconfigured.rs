// SPDX-License-Identifier: Apache-2.0

//! Stand-in executor used when the database settings are incomplete.

use async_trait::async_trait;

use sqlgate_core::{
    ConnectionProbe, EngineError, EngineResult, ExecuteOptions, PoolStats, QueryResult,
    SqlExecutor,
};

/// Fails every database call with a connection error so the rest of the
/// service keeps running.
pub struct UnconfiguredExecutor {
    reason: String,
}

impl UnconfiguredExecutor {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SqlExecutor for UnconfiguredExecutor {
    async fn execute(
        &self,
        _query: &str,
        _params: &[Option<String>],
        _options: ExecuteOptions,
    ) -> EngineResult<QueryResult> {
        Err(EngineError::connection_failed(&self.reason))
    }

    async fn test_connection(&self) -> EngineResult<ConnectionProbe> {
        Err(EngineError::connection_failed(&self.reason))
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats::not_initialized()
    }
}
