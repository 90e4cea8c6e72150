// SPDX-License-Identifier: Apache-2.0

//! Self-describing documentation for the SQL endpoints.

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde_json::{json, Value};

use sqlgate_core::limits::{
    MAX_MAX_ROWS, MAX_PARAMETER_LENGTH, MAX_QUERY_LENGTH, MAX_REQUEST_BYTES, MAX_TIMEOUT_MS,
    MIN_MAX_ROWS, MIN_TIMEOUT_MS,
};

use crate::AppState;

pub(super) async fn docs(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");

    let config = &state.config;
    let window_minutes = state.sql_limiter.window().as_secs() / 60;

    let execute = json!({
        "description": "Execute a SELECT SQL query",
        "parameters": {
            "query": {
                "type": "string",
                "required": true,
                "description": "SQL SELECT query to execute",
            },
            "params": {
                "type": "array",
                "required": false,
                "description": "Query parameters; PostgreSQL infers each parameter type from the query",
            },
            "timeout": {
                "type": "number",
                "required": false,
                "description": format!("Query timeout in milliseconds ({MIN_TIMEOUT_MS}-{MAX_TIMEOUT_MS})"),
                "default": config.query_timeout_ms,
            },
            "limit": {
                "type": "number",
                "required": false,
                "description": format!("Maximum number of rows to return ({MIN_MAX_ROWS}-{MAX_MAX_ROWS})"),
                "default": config.max_rows,
            },
        },
        "example": {
            "query": "SELECT * FROM users WHERE active = $1 LIMIT 10",
            "params": [true],
            "timeout": 15000,
            "limit": 10,
        },
    });

    let endpoints = json!({
        "POST /execute": execute,
        "POST /validate": {
            "description": "Validate SQL query without execution",
            "parameters": {
                "query": {
                    "type": "string",
                    "required": true,
                    "description": "SQL query to validate",
                },
            },
            "example": {
                "query": "SELECT name, email FROM users WHERE created_at > NOW() - INTERVAL '1 day'",
            },
        },
        "GET /test": {
            "description": "Test database connection",
            "parameters": {},
            "example": "GET /api/sql/test",
        },
        "GET /stats": {
            "description": "Get database pool statistics, configuration and request metrics",
            "parameters": {},
            "example": "GET /api/sql/stats",
        },
    });

    let security = json!({
        "Query Restrictions": [
            "Only SELECT statements are allowed",
            "No access to system tables or schemas",
            "No UNION, subqueries with system access, or dangerous functions",
            "Query complexity limits to prevent resource exhaustion",
        ],
        "Rate Limiting": {
            "window": format!("{window_minutes} minutes"),
            "maxRequests": state.sql_limiter.max_requests(),
            "description": "Rate limiting is applied per IP address and User-Agent",
        },
        "Request Limits": {
            "maxQueryLength": format!("{MAX_QUERY_LENGTH} characters"),
            "maxRequestSize": format!("{}KB", MAX_REQUEST_BYTES / 1024),
            "maxParameterLength": format!("{MAX_PARAMETER_LENGTH} characters per parameter"),
        },
        "Response Limits": {
            "maxRows": config.max_rows,
            "maxTimeout": format!("{} minutes", MAX_TIMEOUT_MS / 60_000),
            "description": "Results are automatically truncated if they exceed limits",
        },
    });

    let error_codes = json!({
        "VALIDATION_ERROR": "Request body is malformed or a parameter is too long",
        "INVALID_SQL_QUERY": "Query failed security validation",
        "QUERY_TOO_COMPLEX": "Query complexity exceeds allowed threshold",
        "RATE_LIMIT_EXCEEDED": "Too many requests in the current window",
        "REQUEST_TOO_LARGE": "Request size exceeds maximum allowed",
        "SYNTAX_ERROR": "SQL syntax error in query",
        "PERMISSION_DENIED": "Insufficient database permissions",
        "QUERY_TIMEOUT": "Query execution timeout",
        "DATABASE_UNAVAILABLE": "Database connection unavailable",
        "SQL_EXECUTION_ERROR": "Any other database error",
    });

    let examples = json!({
        "Simple Query": {
            "request": { "query": "SELECT id, name, email FROM users LIMIT 5" },
            "response": {
                "success": true,
                "data": [
                    { "id": 1, "name": "John Doe", "email": "john@example.com" },
                    { "id": 2, "name": "Jane Smith", "email": "jane@example.com" },
                ],
                "rowCount": 2,
                "executionTime": 45,
                "truncated": false,
            },
        },
        "Error Response": {
            "response": {
                "error": true,
                "message": "SQL query validation failed",
                "details": ["Only SELECT statements are allowed"],
                "statusCode": 400,
                "code": "INVALID_SQL_QUERY",
            },
        },
    });

    Json(json!({
        "title": "PostgreSQL SQL API Documentation",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Secure read-only SQL API for PostgreSQL database queries",
        "baseUrl": format!("{scheme}://{host}/api/sql"),
        "endpoints": endpoints,
        "security": security,
        "errorCodes": error_codes,
        "examples": examples,
    }))
}
