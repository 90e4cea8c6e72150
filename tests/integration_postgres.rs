// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL executor tests.
//!
//! Tests marked `#[ignore]` need a live server:
//! `SQLGATE_TEST_PG_HOST=127.0.0.1 cargo test --test integration_postgres -- --ignored`

use std::time::{Duration, Instant};

use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use sqlgate_core::{ErrorCategory, ExecuteOptions, PoolStatus, SqlExecutor};
use sqlgate_lib::config::DatabaseConfig;
use sqlgate_lib::engine::PostgresExecutor;
use sqlgate_lib::observability::Sensitive;

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16_or_default(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn database_config() -> DatabaseConfig {
    DatabaseConfig {
        host: env_or_default("SQLGATE_TEST_PG_HOST", "127.0.0.1"),
        port: env_u16_or_default("SQLGATE_TEST_PG_PORT", 54321),
        database: env_or_default("SQLGATE_TEST_PG_DB", "sqlgate_test"),
        user: env_or_default("SQLGATE_TEST_PG_USER", "sqlgate"),
        password: Sensitive::new(env_or_default("SQLGATE_TEST_PG_PASSWORD", "sqlgate_test")),
        max_connections: 2,
        idle_timeout: Duration::from_secs(30),
        ssl: false,
    }
}

fn options(timeout_ms: u64, max_rows: usize) -> ExecuteOptions {
    ExecuteOptions::new(timeout_ms, max_rows)
}

/// All opened connections are back in the pool.
fn assert_no_leak(executor: &PostgresExecutor) {
    let stats = executor.pool_stats();
    assert_eq!(stats.in_use(), 0, "connections still checked out: {:?}", stats);
}

#[tokio::test]
async fn test_unreachable_database_releases_nothing() {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_millis(300))
        .connect_lazy("postgres://sqlgate@127.0.0.1:1/none")
        .unwrap();
    let executor = PostgresExecutor::from_pool(pool, 2);

    for _ in 0..3 {
        let err = executor
            .execute("SELECT 1", &[], options(1_000, 10))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert_eq!(err.to_string(), "Database connection error");
    }

    let stats = executor.pool_stats();
    assert_eq!(stats.total_count, 0);
    assert_eq!(stats.status, PoolStatus::Active);
}

/// Accepts connections, completes the startup handshake without a password
/// and then never answers another message.
async fn silent_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut len = [0u8; 4];
                if socket.read_exact(&mut len).await.is_err() {
                    return;
                }
                let body = (u32::from_be_bytes(len) as usize).saturating_sub(4);
                let mut startup = vec![0u8; body];
                if socket.read_exact(&mut startup).await.is_err() {
                    return;
                }

                // AuthenticationOk, then ReadyForQuery (idle).
                let greeting = [b'R', 0, 0, 0, 8, 0, 0, 0, 0, b'Z', 0, 0, 0, 5, b'I'];
                if socket.write_all(&greeting).await.is_err() {
                    return;
                }

                let mut sink = [0u8; 1024];
                while matches!(socket.read(&mut sink).await, Ok(n) if n > 0) {}
            });
        }
    });

    port
}

#[tokio::test]
async fn test_unresponsive_server_hits_client_deadline_and_discards_connection() {
    let port = silent_server().await;
    let connect = PgConnectOptions::new()
        .host("127.0.0.1")
        .port(port)
        .username("sqlgate")
        .database("silent")
        .ssl_mode(PgSslMode::Disable);
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy_with(connect);
    let executor = PostgresExecutor::from_pool(pool, 1);

    let started = Instant::now();
    let err = executor
        .execute("SELECT 1", &[], options(1_000, 10))
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert_eq!(err.to_string(), "Query execution timeout");
    // The server-side timeout never fires, so only the client deadline can end the wait.
    assert!(waited >= Duration::from_secs(3), "returned after {:?}", waited);
    assert!(waited < Duration::from_secs(10), "returned after {:?}", waited);

    // The connection is closed in the background rather than returned to the pool.
    let deadline = Instant::now() + Duration::from_secs(3);
    while executor.pool_stats().total_count > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let stats = executor.pool_stats();
    assert_eq!(stats.in_use(), 0, "connections still checked out: {:?}", stats);
    assert_eq!(stats.total_count, 0, "stale connection kept: {:?}", stats);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_parameterized_select_and_truncation() {
    let executor = PostgresExecutor::connect_lazy(&database_config());

    let result = executor
        .execute(
            "SELECT g AS id, 'row ' || g AS label, g * $1 AS step \
             FROM generate_series(1, 25) AS g",
            &[Some("7".to_string())],
            options(5_000, 10),
        )
        .await
        .unwrap();

    assert!(result.truncated);
    assert_eq!(result.row_count, 10);
    assert_eq!(result.rows[0]["id"], json!(1));
    assert_eq!(result.rows[0]["label"], json!("row 1"));
    assert_eq!(result.rows[9]["step"], json!(70));
    let names: Vec<&str> = result.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "label", "step"]);
    assert_eq!(result.fields[0].type_id, Some(23));

    assert_no_leak(&executor);
    executor.close().await;
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_parameters_take_the_type_postgres_infers() {
    let executor = PostgresExecutor::connect_lazy(&database_config());

    let matched = executor
        .execute(
            "SELECT g FROM generate_series(1, 5) AS g WHERE g = $1",
            &[Some("3".to_string())],
            options(5_000, 10),
        )
        .await
        .unwrap();
    assert_eq!(matched.row_count, 1);
    assert_eq!(matched.rows[0]["g"], json!(3));

    let limited = executor
        .execute(
            "SELECT g FROM generate_series(1, 5) AS g ORDER BY g LIMIT $1",
            &[Some("2".to_string())],
            options(5_000, 10),
        )
        .await
        .unwrap();
    assert_eq!(limited.row_count, 2);
    assert!(!limited.truncated);

    let filtered = executor
        .execute(
            "SELECT d FROM (VALUES (DATE '2026-01-01'), (DATE '2026-06-01')) AS t(d) \
             WHERE d > $1 AND $2",
            &[Some("2026-03-01".to_string()), Some("true".to_string())],
            options(5_000, 10),
        )
        .await
        .unwrap();
    assert_eq!(filtered.row_count, 1);
    assert_eq!(filtered.rows[0]["d"], json!("2026-06-01"));

    let none = executor
        .execute(
            "SELECT g FROM generate_series(1, 5) AS g WHERE g = $1",
            &[None],
            options(5_000, 10),
        )
        .await
        .unwrap();
    assert_eq!(none.row_count, 0);

    let bad = executor
        .execute(
            "SELECT g FROM generate_series(1, 5) AS g WHERE g = $1",
            &[Some("three".to_string())],
            options(5_000, 10),
        )
        .await
        .unwrap_err();
    assert_eq!(bad.category(), ErrorCategory::Other);

    let miscounted = executor
        .execute(
            "SELECT g FROM generate_series(1, 5) AS g WHERE g = $1",
            &[Some("1".to_string()), Some("2".to_string())],
            options(5_000, 10),
        )
        .await
        .unwrap_err();
    assert_eq!(miscounted.category(), ErrorCategory::Other);

    assert_no_leak(&executor);
    executor.close().await;
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_value_decoding() {
    let executor = PostgresExecutor::connect_lazy(&database_config());

    let result = executor
        .execute(
            "SELECT 12.50::numeric AS price, NULL::text AS missing, true AS flag, \
             '{\"a\": 1}'::jsonb AS doc, DATE '2026-03-01' AS day",
            &[],
            options(5_000, 10),
        )
        .await
        .unwrap();

    let row = &result.rows[0];
    assert_eq!(row["price"], json!("12.50"));
    assert_eq!(row["missing"], json!(null));
    assert_eq!(row["flag"], json!(true));
    assert_eq!(row["doc"], json!({"a": 1}));
    assert_eq!(row["day"], json!("2026-03-01"));

    let empty = executor
        .execute("SELECT 1 AS one WHERE false", &[], options(5_000, 10))
        .await
        .unwrap();
    assert_eq!(empty.row_count, 0);
    assert!(empty.fields.is_empty());

    executor.close().await;
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_failures_are_categorised_and_release_connections() {
    let executor = PostgresExecutor::connect_lazy(&database_config());

    let syntax = executor
        .execute("SELECT FROM WHERE", &[], options(5_000, 10))
        .await
        .unwrap_err();
    assert_eq!(syntax.category(), ErrorCategory::Syntax);
    assert_no_leak(&executor);

    let missing = executor
        .execute("SELECT * FROM no_such_table_here", &[], options(5_000, 10))
        .await
        .unwrap_err();
    assert_eq!(missing.category(), ErrorCategory::UndefinedObject);
    assert_no_leak(&executor);

    let timeout = executor
        .execute("SELECT pg_sleep(3)", &[], options(1_000, 10))
        .await
        .unwrap_err();
    assert_eq!(timeout.category(), ErrorCategory::Timeout);
    assert_no_leak(&executor);

    // The pool is still usable after the failures.
    let ok = executor
        .execute("SELECT 1 AS one", &[], options(5_000, 10))
        .await
        .unwrap();
    assert_eq!(ok.rows[0]["one"], json!(1));
    assert_no_leak(&executor);

    executor.close().await;
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_connection_check() {
    let executor = PostgresExecutor::connect_lazy(&database_config());

    let status = executor.test_connection().await.unwrap();
    assert!(status.version.starts_with("PostgreSQL"));
    assert!(status.timestamp.ends_with('Z'));
    assert_eq!(status.pool_stats.max_connections, 2);

    executor.close().await;
    let err = executor.test_connection().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Connection);
}
