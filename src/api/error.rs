// SPDX-License-Identifier: Apache-2.0

//! JSON error envelope shared by every endpoint.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

use crate::interceptor::PipelineError;

/// `{error, message, details, statusCode, code, timestamp}` plus optional
/// endpoint-specific fields.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Vec<String>,
    code: Option<&'static str>,
    extra: Map<String, Value>,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Vec::new(),
            code: None,
            extra: Map::new(),
            retry_after_secs: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Adds `retryAfter` to the body and a `Retry-After` header.
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self.with_field("retryAfter", Value::from(secs))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Endpoint not found").with_code("NOT_FOUND")
    }

    pub fn too_large(declared: Option<u64>, limit: usize) -> Self {
        let detail = match declared {
            Some(size) => format!(
                "Request size {size} bytes exceeds maximum allowed size of {limit} bytes"
            ),
            None => format!("Request body exceeds maximum allowed size of {limit} bytes"),
        };
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "Request too large")
            .with_code("REQUEST_TOO_LARGE")
            .with_details(vec![detail])
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let api = Self::new(status, err.to_string())
            .with_code(err.code())
            .with_details(err.details());

        match err {
            PipelineError::Execution {
                execution_time_ms,
                query,
                ..
            } => api
                .with_field("executionTime", Value::from(execution_time_ms))
                .with_field("query", Value::String(query)),
            _ => api,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::Bool(true));
        body.insert("message".to_string(), Value::String(self.message));
        body.insert(
            "details".to_string(),
            Value::Array(self.details.into_iter().map(Value::String).collect()),
        );
        body.insert("statusCode".to_string(), Value::from(self.status.as_u16()));
        if let Some(code) = self.code {
            body.insert("code".to_string(), Value::String(code.to_string()));
        }
        body.insert("timestamp".to_string(), Value::String(super::timestamp()));
        body.extend(self.extra);

        let mut response = (self.status, Json(Value::Object(body))).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_core::EngineError;

    #[test]
    fn test_execution_errors_carry_timing_and_query() {
        let err = ApiError::from(PipelineError::Execution {
            error: EngineError::timeout(2_000),
            execution_time_ms: 2_004,
            query: "SELECT pg_sleep(10)".to_string(),
        });
        assert_eq!(err.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.code, Some("QUERY_TIMEOUT"));
        assert_eq!(err.details, vec!["Query execution timeout"]);
        assert_eq!(err.extra["executionTime"], 2_004);
    }

    #[test]
    fn test_retry_after_sets_header() {
        let response = ApiError::new(StatusCode::TOO_MANY_REQUESTS, "Too many requests")
            .with_retry_after(42)
            .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
