// SPDX-License-Identifier: Apache-2.0

//! Structural checks on an incoming request body.
//!
//! Runs before any SQL analysis. Bodies are inspected as raw JSON so that a
//! wrong type produces a field-specific message instead of a decode error.

use serde_json::{Map, Value};
use thiserror::Error;

use sqlgate_core::limits::{MAX_MAX_ROWS, MAX_TIMEOUT_MS, MIN_MAX_ROWS, MIN_TIMEOUT_MS};

use crate::params::ParameterError;

/// A structurally valid request. `params` is still raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRequest {
    pub query: String,
    pub params: Value,
    pub timeout_ms: Option<u64>,
    pub max_rows: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: query")]
    MissingQuery,

    #[error("Invalid query format")]
    QueryNotString,

    #[error("Invalid parameters format")]
    ParamsNotArray,

    #[error("Invalid timeout value")]
    InvalidTimeout,

    #[error("Invalid limit value")]
    InvalidLimit,

    #[error("Parameter validation failed")]
    Parameter(#[from] ParameterError),
}

impl RequestError {
    /// Detail lines for the error envelope.
    pub fn details(&self) -> Vec<String> {
        let detail = match self {
            Self::NotAnObject => "Expected an object with a query field".to_string(),
            Self::MissingQuery => "Query parameter is required".to_string(),
            Self::QueryNotString => "Query must be a string".to_string(),
            Self::ParamsNotArray => "Parameters must be an array".to_string(),
            Self::InvalidTimeout => format!(
                "Timeout must be a number between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} milliseconds"
            ),
            Self::InvalidLimit => {
                format!("Limit must be a number between {MIN_MAX_ROWS} and {MAX_MAX_ROWS}")
            }
            Self::Parameter(err) => err.to_string(),
        };
        vec![detail]
    }
}

/// Checks field presence and types. `null` optional fields count as omitted.
pub fn parse_request(body: &Value) -> Result<SqlRequest, RequestError> {
    let Value::Object(fields) = body else {
        return Err(RequestError::NotAnObject);
    };

    let query = match fields.get("query") {
        None | Some(Value::Null) => return Err(RequestError::MissingQuery),
        Some(Value::String(q)) if q.is_empty() => return Err(RequestError::MissingQuery),
        Some(Value::String(q)) => q.clone(),
        Some(_) => return Err(RequestError::QueryNotString),
    };

    let params = match fields.get("params") {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(p @ Value::Array(_)) => p.clone(),
        Some(_) => return Err(RequestError::ParamsNotArray),
    };

    let timeout_ms = bounded_number(fields, "timeout", MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
        .map_err(|()| RequestError::InvalidTimeout)?;

    let max_rows = bounded_number(fields, "limit", MIN_MAX_ROWS as u64, MAX_MAX_ROWS as u64)
        .map_err(|()| RequestError::InvalidLimit)?
        .map(|n| n as usize);

    Ok(SqlRequest {
        query,
        params,
        timeout_ms,
        max_rows,
    })
}

fn bounded_number(
    fields: &Map<String, Value>,
    key: &str,
    min: u64,
    max: u64,
) -> Result<Option<u64>, ()> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let value = n.as_f64().ok_or(())?;
            if value.is_finite() && value >= min as f64 && value <= max as f64 {
                Ok(Some(value.trunc() as u64))
            } else {
                Err(())
            }
        }
        Some(_) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_request() {
        let request = parse_request(&json!({"query": "SELECT 1"})).unwrap();
        assert_eq!(request.query, "SELECT 1");
        assert_eq!(request.params, json!([]));
        assert_eq!(request.timeout_ms, None);
        assert_eq!(request.max_rows, None);
    }

    #[test]
    fn test_full_request() {
        let request = parse_request(&json!({
            "query": "SELECT * FROM t WHERE id = $1",
            "params": [7],
            "timeout": 5000,
            "limit": 25
        }))
        .unwrap();
        assert_eq!(request.params, json!([7]));
        assert_eq!(request.timeout_ms, Some(5000));
        assert_eq!(request.max_rows, Some(25));
    }

    #[test]
    fn test_missing_or_empty_query() {
        assert_eq!(parse_request(&json!({})), Err(RequestError::MissingQuery));
        assert_eq!(
            parse_request(&json!({"query": ""})),
            Err(RequestError::MissingQuery)
        );
        assert_eq!(
            parse_request(&json!({"query": null})),
            Err(RequestError::MissingQuery)
        );
        assert_eq!(
            RequestError::MissingQuery.details(),
            vec!["Query parameter is required"]
        );
    }

    #[test]
    fn test_wrong_types() {
        assert_eq!(
            parse_request(&json!({"query": 5})),
            Err(RequestError::QueryNotString)
        );
        assert_eq!(
            parse_request(&json!({"query": "SELECT 1", "params": "x"})),
            Err(RequestError::ParamsNotArray)
        );
        assert_eq!(parse_request(&json!([1])), Err(RequestError::NotAnObject));
    }

    #[test]
    fn test_timeout_bounds() {
        for bad in [json!(0), json!(999), json!(300_001), json!("5000"), json!(-1)] {
            assert_eq!(
                parse_request(&json!({"query": "SELECT 1", "timeout": bad})),
                Err(RequestError::InvalidTimeout),
            );
        }
        for good in [1000, 300_000] {
            let request = parse_request(&json!({"query": "SELECT 1", "timeout": good})).unwrap();
            assert_eq!(request.timeout_ms, Some(good));
        }
        assert_eq!(
            RequestError::InvalidTimeout.details(),
            vec!["Timeout must be a number between 1000 and 300000 milliseconds"]
        );
    }

    #[test]
    fn test_limit_bounds() {
        for bad in [json!(0), json!(10_001), json!(true)] {
            assert_eq!(
                parse_request(&json!({"query": "SELECT 1", "limit": bad})),
                Err(RequestError::InvalidLimit),
            );
        }
        let request = parse_request(&json!({"query": "SELECT 1", "limit": null})).unwrap();
        assert_eq!(request.max_rows, None);
    }

    #[test]
    fn test_parameter_error_details() {
        let err = RequestError::from(ParameterError::TooLong {
            index: 0,
            length: 1001,
        });
        assert_eq!(err.to_string(), "Parameter validation failed");
        assert_eq!(
            err.details(),
            vec!["Parameter exceeds maximum length of 1000 characters"]
        );
    }
}
