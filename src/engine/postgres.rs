// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL executor
//!
//! Runs validated, read-only queries against a shared `PgPool`. Each call
//! acquires one pooled connection, sets the session `statement_timeout`,
//! prepares the query so the server infers the parameter types, binds the
//! text parameters as those types and releases the connection when the
//! `PoolConnection` guard drops, whatever the outcome.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Executor, Row, Statement};

use sqlgate_core::{
    ConnectionProbe, EngineError, EngineResult, ExecuteOptions, PoolStats, PoolStatus,
    QueryResult, SqlExecutor,
};

use crate::config::DatabaseConfig;
use crate::engine::postgres_utils::{convert_row, field_info, InferredParam};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack on top of the statement timeout before the client gives up on the
/// server and discards the connection.
const TIMEOUT_GRACE: Duration = Duration::from_secs(2);

pub struct PostgresExecutor {
    pool: PgPool,
    max_connections: u32,
}

impl PostgresExecutor {
    /// Builds the pool without connecting; connections open on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(config.password.expose())
            .ssl_mode(if config.ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            });

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(0)
            .idle_timeout(config.idle_timeout)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(options);

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections,
            ssl = config.ssl,
            "PostgreSQL pool configured"
        );

        Self::from_pool(pool, config.max_connections)
    }

    pub fn from_pool(pool: PgPool, max_connections: u32) -> Self {
        Self {
            pool,
            max_connections,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SqlExecutor for PostgresExecutor {
    async fn execute(
        &self,
        query: &str,
        params: &[Option<String>],
        options: ExecuteOptions,
    ) -> EngineResult<QueryResult> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;

        let backstop = Duration::from_millis(options.timeout_ms) + TIMEOUT_GRACE;
        let start = Instant::now();
        let fetched = tokio::time::timeout(
            backstop,
            run_statement(&mut conn, query, params, options.timeout_ms),
        )
        .await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let rows = match fetched {
            Ok(result) => result.map_err(map_sqlx_error)?,
            Err(_) => {
                // The server never answered; the session state is unknown.
                conn.close_on_drop();
                tracing::warn!(
                    timeout_ms = options.timeout_ms,
                    execution_time_ms,
                    "Statement outlived its timeout, discarding connection"
                );
                return Err(EngineError::timeout(options.timeout_ms));
            }
        };

        let fields = rows.first().map(field_info).unwrap_or_default();
        let records = rows.iter().map(convert_row).collect();

        Ok(QueryResult::new(records, fields, execution_time_ms).truncate_to(options.max_rows))
    }

    async fn test_connection(&self) -> EngineResult<ConnectionProbe> {
        let row = sqlx::query("SELECT NOW() AS current_time, version() AS version")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let timestamp: chrono::DateTime<chrono::Utc> =
            row.try_get("current_time").map_err(map_sqlx_error)?;
        let version: String = row.try_get("version").map_err(map_sqlx_error)?;

        Ok(ConnectionProbe {
            timestamp: timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            version,
            pool_stats: self.pool_stats(),
        })
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            status: if self.pool.is_closed() {
                PoolStatus::Closed
            } else {
                PoolStatus::Active
            },
            total_count: self.pool.size(),
            idle_count: self.pool.num_idle() as u32,
            max_connections: self.max_connections,
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}

/// Sets the session timeout, then runs `query` with each parameter sent as
/// the type the server inferred for its placeholder.
async fn run_statement(
    conn: &mut PgConnection,
    query: &str,
    params: &[Option<String>],
    timeout_ms: u64,
) -> Result<Vec<PgRow>, sqlx::Error> {
    // SET does not accept bind parameters; the value is a clamped integer.
    sqlx::query(&format!("SET statement_timeout = {}", timeout_ms))
        .execute(&mut *conn)
        .await?;

    let statement = (&mut *conn).prepare(query).await?;
    let inferred = statement
        .parameters()
        .and_then(|parameters| parameters.left())
        .unwrap_or_default();
    if inferred.len() != params.len() {
        // The server reports this mismatch with a connection-class SQLSTATE.
        return Err(sqlx::Error::Protocol(format!(
            "query has {} parameter placeholders but {} parameters were supplied",
            inferred.len(),
            params.len()
        )));
    }

    let mut bound = statement.query();
    for (position, param) in params.iter().enumerate() {
        bound = bound.bind(InferredParam::new(param.clone(), inferred.get(position)));
    }
    bound.fetch_all(&mut *conn).await
}

/// Maps a sqlx failure onto the sanitized error taxonomy.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> EngineError {
    match &err {
        sqlx::Error::Database(db) => EngineError::from_driver(db.message(), db.code().as_deref()),
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => EngineError::connection_failed(err.to_string()),
        _ => EngineError::from_driver(&err.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_core::ErrorCategory;

    #[test]
    fn test_pool_errors_map_to_connection() {
        for err in [sqlx::Error::PoolTimedOut, sqlx::Error::PoolClosed] {
            assert_eq!(map_sqlx_error(err).category(), ErrorCategory::Connection);
        }

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let mapped = map_sqlx_error(sqlx::Error::Io(io));
        assert_eq!(mapped.category(), ErrorCategory::Connection);
        assert_eq!(mapped.to_string(), "Database connection error");
    }

    #[test]
    fn test_other_errors_are_classified_by_text() {
        let mapped = map_sqlx_error(sqlx::Error::ColumnNotFound("total".to_string()));
        assert_eq!(mapped.category(), ErrorCategory::Other);
        assert!(mapped.to_string().contains("total"));
    }

    #[tokio::test]
    async fn test_lazy_pool_starts_empty() {
        let pool = PgPoolOptions::new()
            .max_connections(3)
            .connect_lazy("postgres://reader@127.0.0.1:1/none")
            .unwrap();
        let executor = PostgresExecutor::from_pool(pool, 3);

        let stats = executor.pool_stats();
        assert_eq!(stats.status, PoolStatus::Active);
        assert_eq!(stats.total_count, 0);
        assert_eq!(stats.max_connections, 3);

        executor.close().await;
        assert_eq!(executor.pool_stats().status, PoolStatus::Closed);
    }
}
