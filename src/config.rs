// SPDX-License-Identifier: Apache-2.0

//! Environment-driven configuration.
//!
//! Loaded once at startup. Malformed numeric values fall back to their
//! defaults; the fallbacks are collected in [`Config::warnings`] so they can
//! be logged once tracing is up.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use sqlgate_core::limits::{clamp_max_rows, clamp_timeout_ms};

use crate::observability::Sensitive;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 900_000;
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
pub const DEFAULT_SQL_RATE_LIMIT_MAX: u32 = 20;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_ROWS: usize = 1_000;
pub const DEFAULT_COMPLEXITY_WARN: u32 = 10;
pub const DEFAULT_COMPLEXITY_REJECT: u32 = 20;
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_IDLE_TIMEOUT_MS: u64 = 30_000;

const REQUIRED_DATABASE_VARS: [&str; 5] = [
    "POSTGRES_HOST",
    "POSTGRES_PORT",
    "POSTGRES_DB",
    "POSTGRES_USER",
    "POSTGRES_PASSWORD",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required PostgreSQL environment variables: {}", .0.join(", "))]
    MissingDatabaseVars(Vec<&'static str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Daily-rolling JSON log files are written here when set
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Sensitive<String>,
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub ssl: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub general_rate_limit: RateLimitSettings,
    pub sql_rate_limit: RateLimitSettings,
    /// Default statement timeout, already clamped
    pub query_timeout_ms: u64,
    /// Default row cap, already clamped
    pub max_rows: usize,
    pub complexity_warn_threshold: u32,
    pub complexity_reject_threshold: u32,
    /// The SQL subsystem is disabled when this is an error; the server still runs.
    pub database: Result<DatabaseConfig, ConfigError>,
    pub audit_log_path: Option<PathBuf>,
    /// Take the client address from `X-Forwarded-For` instead of the socket.
    /// Only safe behind a reverse proxy that overwrites the header.
    pub trust_proxy: bool,
    pub log: LogSettings,
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = Lookup {
            get: &lookup,
            warnings: Vec::new(),
        };

        let general_rate_limit = RateLimitSettings {
            window: Duration::from_millis(
                env.parse("RATE_LIMIT_WINDOW_MS", DEFAULT_RATE_LIMIT_WINDOW_MS),
            ),
            max_requests: env.parse("RATE_LIMIT_MAX_REQUESTS", DEFAULT_RATE_LIMIT_MAX),
        };
        let sql_rate_limit = RateLimitSettings {
            window: Duration::from_millis(
                env.parse("SQL_RATE_LIMIT_WINDOW", DEFAULT_RATE_LIMIT_WINDOW_MS),
            ),
            max_requests: env.parse("SQL_RATE_LIMIT_MAX", DEFAULT_SQL_RATE_LIMIT_MAX),
        };

        let query_timeout_ms =
            clamp_timeout_ms(env.parse("SQL_QUERY_TIMEOUT", DEFAULT_QUERY_TIMEOUT_MS));
        let max_rows = clamp_max_rows(env.parse("SQL_MAX_ROWS", DEFAULT_MAX_ROWS));

        let complexity_warn_threshold = env.parse("SQL_COMPLEXITY_WARN", DEFAULT_COMPLEXITY_WARN);
        let mut complexity_reject_threshold =
            env.parse("SQL_COMPLEXITY_REJECT", DEFAULT_COMPLEXITY_REJECT);
        if complexity_reject_threshold < complexity_warn_threshold {
            env.warnings.push(format!(
                "SQL_COMPLEXITY_REJECT ({complexity_reject_threshold}) is below SQL_COMPLEXITY_WARN \
                 ({complexity_warn_threshold}); using the warn threshold for both"
            ));
            complexity_reject_threshold = complexity_warn_threshold;
        }

        let database = env.database();

        let log = LogSettings {
            format: match env.text("LOG_FORMAT").as_deref() {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            dir: env.text("LOG_DIR").map(PathBuf::from),
        };

        Self {
            host: env.text("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.parse("PORT", DEFAULT_PORT),
            general_rate_limit,
            sql_rate_limit,
            query_timeout_ms,
            max_rows,
            complexity_warn_threshold,
            complexity_reject_threshold,
            database,
            audit_log_path: env.text("AUDIT_LOG_PATH").map(PathBuf::from),
            trust_proxy: env.flag("TRUST_PROXY"),
            log,
            warnings: env.warnings,
        }
    }

    pub fn max_connections(&self) -> u32 {
        self.database
            .as_ref()
            .map(|db| db.max_connections)
            .unwrap_or(DEFAULT_PG_MAX_CONNECTIONS)
    }
}

struct Lookup<'a, F> {
    get: &'a F,
    warnings: Vec<String>,
}

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty, trimmed value of a variable.
    fn text(&self, key: &str) -> Option<String> {
        (self.get)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        match self.text(key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                self.warnings
                    .push(format!("{key}={raw:?} is not valid; using default {default}"));
                default
            }),
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.text(key).is_some_and(|value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "require"
            )
        })
    }

    fn database(&mut self) -> Result<DatabaseConfig, ConfigError> {
        let missing: Vec<&'static str> = REQUIRED_DATABASE_VARS
            .iter()
            .copied()
            .filter(|key| self.text(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingDatabaseVars(missing));
        }

        Ok(DatabaseConfig {
            host: self.text("POSTGRES_HOST").unwrap_or_default(),
            port: self.parse("POSTGRES_PORT", DEFAULT_PG_PORT),
            database: self.text("POSTGRES_DB").unwrap_or_default(),
            user: self.text("POSTGRES_USER").unwrap_or_default(),
            password: Sensitive::new((self.get)("POSTGRES_PASSWORD").unwrap_or_default()),
            max_connections: self
                .parse("POSTGRES_MAX_CONNECTIONS", DEFAULT_PG_MAX_CONNECTIONS)
                .max(1),
            idle_timeout: Duration::from_millis(
                self.parse("POSTGRES_IDLE_TIMEOUT", DEFAULT_PG_IDLE_TIMEOUT_MS),
            ),
            ssl: self.flag("POSTGRES_SSL"),
        })
    }
}
