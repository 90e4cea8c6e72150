// SPDX-License-Identifier: Apache-2.0

//! Interceptor Pipeline
//!
//! Runs a SQL request through its gates in a fixed order:
//! 1. structural checks on the body
//! 2. bind parameter sanitization
//! 3. static security validation
//! 4. complexity policy
//! 5. pre-execution audit, execution, outcome audit
//!
//! The first failing gate ends the request. Rate limiting happens earlier,
//! in the HTTP layer, so a throttled request never reaches this type.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;

use sqlgate_core::{
    ComplexityAssessment, EngineError, ErrorCategory, ExecuteOptions, QueryResult, SqlExecutor,
    ValidationResult,
};
use sqlgate_sql::{
    assess, extract_table_names, parse_request, sanitize_parameters, validate, ComplexityPolicy,
    ComplexityVerdict, RequestError, SqlRequest,
};

use super::audit::AuditStore;
use super::types::{AuditEvent, AuditLogEntry, ClientInfo};
use crate::metrics::Metrics;

/// Tunables of the pipeline, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinePolicy {
    pub complexity: ComplexityPolicy,
    /// Statement timeout when the request names none
    pub default_timeout_ms: u64,
    /// Row cap when the request names none
    pub default_max_rows: usize,
}

/// A request that passed every gate before execution.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub request: SqlRequest,
    pub params: Vec<Option<String>>,
    pub validation: ValidationResult,
    pub complexity: ComplexityAssessment,
    pub verdict: ComplexityVerdict,
    pub tables: Vec<String>,
    /// Validator warnings plus the advisory complexity note, if any
    pub warnings: Vec<String>,
}

impl Analysis {
    pub fn options(&self, policy: &PipelinePolicy) -> ExecuteOptions {
        ExecuteOptions::new(
            self.request.timeout_ms.unwrap_or(policy.default_timeout_ms),
            self.request.max_rows.unwrap_or(policy.default_max_rows),
        )
    }
}

/// A successfully executed request.
#[derive(Debug, Clone)]
pub struct Execution {
    pub analysis: Analysis,
    pub options: ExecuteOptions,
    pub result: QueryResult,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Request(#[from] RequestError),

    #[error("SQL query validation failed")]
    InvalidQuery { errors: Vec<String> },

    #[error("Query too complex")]
    TooComplex { score: u32, issues: Vec<String> },

    #[error("SQL query execution failed")]
    Execution {
        error: EngineError,
        execution_time_ms: u64,
        query: String,
    },
}

impl PipelineError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Request(_) | Self::InvalidQuery { .. } | Self::TooComplex { .. } => 400,
            Self::Execution { error, .. } => match error.category() {
                ErrorCategory::Syntax => 400,
                ErrorCategory::PermissionDenied => 403,
                ErrorCategory::Timeout => 408,
                ErrorCategory::Connection => 503,
                ErrorCategory::UndefinedObject | ErrorCategory::Other => 500,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Request(_) => "VALIDATION_ERROR",
            Self::InvalidQuery { .. } => "INVALID_SQL_QUERY",
            Self::TooComplex { .. } => "QUERY_TOO_COMPLEX",
            Self::Execution { error, .. } => match error.category() {
                ErrorCategory::Syntax => "SYNTAX_ERROR",
                ErrorCategory::PermissionDenied => "PERMISSION_DENIED",
                ErrorCategory::Timeout => "QUERY_TIMEOUT",
                ErrorCategory::Connection => "DATABASE_UNAVAILABLE",
                ErrorCategory::UndefinedObject | ErrorCategory::Other => "SQL_EXECUTION_ERROR",
            },
        }
    }

    /// Client-facing detail lines.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Request(err) => err.details(),
            Self::InvalidQuery { errors } => errors.clone(),
            Self::TooComplex { issues, .. } => {
                let mut details = vec!["Query complexity exceeds maximum allowed threshold".to_string()];
                details.extend(issues.iter().cloned());
                details
            }
            Self::Execution { error, .. } => vec![error.to_string()],
        }
    }

    /// Server-side description for the audit log.
    fn audit_detail(&self) -> String {
        match self {
            Self::Execution { error, .. } => error.detail().to_string(),
            other => other.details().join("; "),
        }
    }
}

pub struct RequestPipeline {
    executor: Arc<dyn SqlExecutor>,
    audit: Arc<AuditStore>,
    metrics: Arc<Metrics>,
    policy: PipelinePolicy,
}

impl RequestPipeline {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        audit: Arc<AuditStore>,
        metrics: Arc<Metrics>,
        policy: PipelinePolicy,
    ) -> Self {
        tracing::info!(
            warn_threshold = policy.complexity.warn_threshold,
            reject_threshold = policy.complexity.reject_threshold,
            default_timeout_ms = policy.default_timeout_ms,
            default_max_rows = policy.default_max_rows,
            "Request pipeline initialized"
        );

        Self {
            executor,
            audit,
            metrics,
            policy,
        }
    }

    pub fn executor(&self) -> &Arc<dyn SqlExecutor> {
        &self.executor
    }

    pub fn audit(&self) -> &AuditStore {
        &self.audit
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    /// Runs every gate up to, but excluding, execution.
    pub fn analyze(&self, body: &Value, client: &ClientInfo) -> Result<Analysis, PipelineError> {
        self.run_gates(body).inspect_err(|err| self.reject(body, client, err))
    }

    /// Runs all gates, then the query.
    pub async fn execute(
        &self,
        body: &Value,
        client: &ClientInfo,
    ) -> Result<Execution, PipelineError> {
        let analysis = self.analyze(body, client)?;
        let options = analysis.options(&self.policy);
        let query = analysis.request.query.as_str();

        self.audit.log(
            AuditLogEntry::new(AuditEvent::Request, client, query, analysis.params.len())
                .with_tables(analysis.tables.clone())
                .with_complexity(analysis.complexity.score)
                .with_warnings(analysis.warnings.clone()),
        );

        let started = Instant::now();
        match self.executor.execute(query, &analysis.params, options).await {
            Ok(result) => {
                self.metrics.record_query(result.execution_time_ms, true);
                self.audit.log(
                    AuditLogEntry::new(AuditEvent::Outcome, client, query, analysis.params.len())
                        .with_status(200, None)
                        .with_rows(result.row_count, result.execution_time_ms),
                );

                Ok(Execution {
                    analysis,
                    options,
                    result,
                })
            }
            Err(error) => {
                let execution_time_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_query(execution_time_ms, false);
                if error.category() == ErrorCategory::Timeout {
                    self.metrics.record_timeout();
                }

                let err = PipelineError::Execution {
                    error,
                    execution_time_ms,
                    query: analysis.request.query.clone(),
                };
                self.audit.log(
                    AuditLogEntry::new(AuditEvent::Outcome, client, query, analysis.params.len())
                        .with_status(err.status_code(), Some(err.code()))
                        .with_error(err.audit_detail(), Some(execution_time_ms)),
                );
                Err(err)
            }
        }
    }

    fn run_gates(&self, body: &Value) -> Result<Analysis, PipelineError> {
        let request = parse_request(body)?;
        let params = sanitize_parameters(&request.params).map_err(RequestError::from)?;

        let validation = validate(&request.query);
        if !validation.is_valid {
            return Err(PipelineError::InvalidQuery {
                errors: validation.errors,
            });
        }

        let complexity = assess(&request.query);
        let verdict = self.policy.complexity.verdict(&complexity);
        let mut warnings = validation.warnings.clone();
        match verdict {
            ComplexityVerdict::Reject => {
                return Err(PipelineError::TooComplex {
                    score: complexity.score,
                    issues: complexity.issues,
                })
            }
            ComplexityVerdict::Advisory => warnings.push(format!(
                "Query complexity score {} exceeds warning threshold {}",
                complexity.score, self.policy.complexity.warn_threshold
            )),
            ComplexityVerdict::Accept => {}
        }

        let tables = extract_table_names(&request.query);

        Ok(Analysis {
            request,
            params,
            validation,
            complexity,
            verdict,
            tables,
            warnings,
        })
    }

    fn reject(&self, body: &Value, client: &ClientInfo, err: &PipelineError) {
        self.metrics.record_rejection();

        let query = body.get("query").and_then(Value::as_str).unwrap_or_default();
        let mut entry = AuditLogEntry::new(AuditEvent::Rejected, client, query, 0)
            .with_status(err.status_code(), Some(err.code()))
            .with_error(err.audit_detail(), None);
        if let PipelineError::TooComplex { score, .. } = err {
            entry = entry.with_complexity(*score);
        }
        self.audit.log(entry);
    }
}
