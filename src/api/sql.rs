// SPDX-License-Identifier: Apache-2.0

//! `/api/sql` handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use sqlgate_core::limits::MAX_REQUEST_BYTES;

use super::{timestamp, ApiError};
use crate::interceptor::{ClientInfo, Execution};
use crate::AppState;

/// Maps an undecodable body onto the error envelope.
fn body_rejection(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::too_large(None, MAX_REQUEST_BYTES);
    }
    ApiError::new(StatusCode::BAD_REQUEST, "Invalid JSON in request body")
        .with_code("VALIDATION_ERROR")
        .with_details(vec![rejection.body_text()])
}

pub(super) async fn execute(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(body_rejection)?;

    let Execution {
        analysis,
        options,
        result,
    } = state.pipeline.execute(&body, &client).await?;

    tracing::debug!(
        tables = ?analysis.tables,
        row_count = result.row_count,
        truncated = result.truncated,
        "SQL query served"
    );

    let mut response = json!({
        "success": true,
        "data": result.rows,
        "rowCount": result.row_count,
        "executionTime": result.execution_time_ms,
        "query": analysis.request.query,
        "tables": analysis.tables,
        "truncated": result.truncated,
        "fields": result.fields,
        "warnings": analysis.warnings,
        "complexity": {
            "score": analysis.complexity.score,
            "issues": analysis.complexity.issues,
        },
    });
    if result.truncated {
        response["message"] = json!(format!("Results truncated to {} rows", options.max_rows));
    }

    Ok(Json(response))
}

pub(super) async fn validate(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(body_rejection)?;
    let analysis = state.pipeline.analyze(&body, &client)?;

    let validation = &analysis.validation;
    let complexity = &analysis.complexity;

    // Invalid queries never get here; `analyze` already refused them.
    let level = if complexity.is_complex { "medium" } else { "high" };
    let recommendations: Vec<&String> = validation
        .warnings
        .iter()
        .chain(complexity.issues.iter())
        .collect();

    Ok(Json(json!({
        "success": true,
        "valid": validation.is_valid,
        "query": analysis.request.query,
        "tables": analysis.tables,
        "validation": {
            "errors": validation.errors,
            "warnings": validation.warnings,
            "normalizedQuery": validation.normalized_query,
        },
        "complexity": {
            "score": complexity.score,
            "isComplex": complexity.is_complex,
            "issues": complexity.issues,
        },
        "estimatedSafety": {
            "level": level,
            "recommendations": recommendations,
        },
    })))
}

pub(super) async fn test_connection(State(state): State<AppState>) -> Response {
    let executor = state.pipeline.executor();

    match executor.test_connection().await {
        Ok(probe) => Json(json!({
            "success": true,
            "message": "Database connection successful",
            "timestamp": probe.timestamp,
            "version": probe.version,
            "poolStats": probe.pool_stats,
        }))
        .into_response(),
        Err(err) => {
            tracing::warn!(error = %err.detail(), "Database connection test failed");
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Database connection failed")
                .with_code("DATABASE_CONNECTION_FAILED")
                .with_details(vec![err.to_string()])
                .with_field("poolStats", json!(executor.pool_stats()))
                .into_response()
        }
    }
}

pub(super) async fn stats(State(state): State<AppState>) -> Json<Value> {
    let config = &state.config;
    let pipeline = &state.pipeline;

    Json(json!({
        "success": true,
        "poolStats": pipeline.executor().pool_stats(),
        "configuration": {
            "maxConnections": config.max_connections(),
            "queryTimeout": config.query_timeout_ms,
            "maxRows": config.max_rows,
            "rateLimitWindow": state.sql_limiter.window().as_millis() as u64,
            "rateLimitMax": state.sql_limiter.max_requests(),
            "complexityWarnThreshold": pipeline.policy().complexity.warn_threshold,
            "complexityRejectThreshold": pipeline.policy().complexity.reject_threshold,
        },
        "metrics": pipeline.metrics().snapshot(),
        "audit": pipeline.audit().stats(),
        "timestamp": timestamp(),
    }))
}
