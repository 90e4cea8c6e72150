// SPDX-License-Identifier: Apache-2.0

// sqlgate - read-only SQL gateway
// Core library

pub mod api;
pub mod config;
pub mod engine;
pub mod interceptor;
pub mod metrics;
pub mod observability;
pub mod rate_limit;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::net::TcpListener;

use sqlgate_core::SqlExecutor;

use config::Config;
use interceptor::audit::MEMORY_CACHE_SIZE;
use interceptor::{AuditStore, PipelinePolicy, RequestPipeline};
use metrics::Metrics;
use rate_limit::RateLimiter;

/// Shared handler state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
    pub general_limiter: Arc<RateLimiter>,
    pub sql_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, executor: Arc<dyn SqlExecutor>, audit: Arc<AuditStore>) -> Self {
        let policy = PipelinePolicy {
            complexity: sqlgate_sql::ComplexityPolicy {
                warn_threshold: config.complexity_warn_threshold,
                reject_threshold: config.complexity_reject_threshold,
            },
            default_timeout_ms: config.query_timeout_ms,
            default_max_rows: config.max_rows,
        };
        let pipeline = RequestPipeline::new(executor, audit, Arc::new(Metrics::new()), policy);

        Self {
            pipeline: Arc::new(pipeline),
            general_limiter: Arc::new(RateLimiter::from_settings(config.general_rate_limit)),
            sql_limiter: Arc::new(RateLimiter::from_settings(config.sql_rate_limit)),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open audit log {path}: {source}")]
    AuditLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Serves until Ctrl-C or SIGTERM, then closes the pool and the audit log.
pub async fn run(config: Config) -> Result<(), StartupError> {
    let audit = match &config.audit_log_path {
        Some(path) => AuditStore::with_file(path, MEMORY_CACHE_SIZE).map_err(|source| {
            StartupError::AuditLog {
                path: path.clone(),
                source,
            }
        })?,
        None => AuditStore::new(MEMORY_CACHE_SIZE),
    };
    let audit = Arc::new(audit);
    let executor = engine::build_executor(&config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let state = AppState::new(config, Arc::clone(&executor), Arc::clone(&audit));
    let app = api::router(state);

    tracing::info!(%addr, "sqlgate listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(StartupError::Serve)?;

    tracing::info!("Shutting down");
    executor.close().await;
    audit.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
