// SPDX-License-Identifier: Apache-2.0

//! SqlExecutor trait definition
//!
//! The only path from the request pipeline to a database. Implementations own
//! their connection pool; callers never hold a connection.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{ConnectionProbe, ExecuteOptions, PoolStats, QueryResult};

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Runs one parameterized, already-validated query.
    ///
    /// Implementations must apply `options.timeout_ms` as a statement timeout,
    /// truncate to `options.max_rows`, and release their connection on every
    /// exit path.
    async fn execute(
        &self,
        query: &str,
        params: &[Option<String>],
        options: ExecuteOptions,
    ) -> EngineResult<QueryResult>;

    /// Round-trips a trivial query to confirm the database is reachable.
    async fn test_connection(&self) -> EngineResult<ConnectionProbe>;

    fn pool_stats(&self) -> PoolStats;

    /// Closes the pool; later calls fail with a connection error.
    async fn close(&self) {}
}
