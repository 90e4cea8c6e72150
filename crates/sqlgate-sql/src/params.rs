// SPDX-License-Identifier: Apache-2.0

//! Bind parameter normalization.

use serde_json::Value;
use thiserror::Error;

use sqlgate_core::limits::MAX_PARAMETER_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("Parameter exceeds maximum length of 1000 characters")]
    TooLong { index: usize, length: usize },
}

/// Converts client-supplied parameters into bindable text values.
///
/// Anything other than a JSON array yields no parameters. `null` stays
/// absent; every other value is bound as its textual form.
pub fn sanitize_parameters(params: &Value) -> Result<Vec<Option<String>>, ParameterError> {
    let Value::Array(items) = params else {
        return Ok(Vec::new());
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match stringify(item) {
            Some(text) => {
                let length = text.chars().count();
                if length > MAX_PARAMETER_LENGTH {
                    Err(ParameterError::TooLong { index, length })
                } else {
                    Ok(Some(text))
                }
            }
            None => Ok(None),
        })
        .collect()
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Structured values bind as their JSON text.
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_array_yields_nothing() {
        assert_eq!(sanitize_parameters(&Value::Null).unwrap(), Vec::<Option<String>>::new());
        assert!(sanitize_parameters(&json!({"a": 1})).unwrap().is_empty());
        assert!(sanitize_parameters(&json!("x")).unwrap().is_empty());
    }

    #[test]
    fn test_scalars_become_text() {
        let params = sanitize_parameters(&json!([42, "abc", null, true, 1.5])).unwrap();
        assert_eq!(
            params,
            vec![
                Some("42".to_string()),
                Some("abc".to_string()),
                None,
                Some("true".to_string()),
                Some("1.5".to_string()),
            ]
        );
    }

    #[test]
    fn test_structured_values_use_json_text() {
        let params = sanitize_parameters(&json!([[1, 2], {"k": "v"}])).unwrap();
        assert_eq!(params[0].as_deref(), Some("[1,2]"));
        assert_eq!(params[1].as_deref(), Some(r#"{"k":"v"}"#));
    }

    #[test]
    fn test_length_limit_is_inclusive() {
        let at_limit = "x".repeat(MAX_PARAMETER_LENGTH);
        assert!(sanitize_parameters(&json!([at_limit])).is_ok());

        let over = "x".repeat(MAX_PARAMETER_LENGTH + 1);
        let err = sanitize_parameters(&json!(["ok", over])).unwrap_err();
        assert_eq!(
            err,
            ParameterError::TooLong {
                index: 1,
                length: MAX_PARAMETER_LENGTH + 1
            }
        );
        assert_eq!(
            err.to_string(),
            "Parameter exceeds maximum length of 1000 characters"
        );
    }
}
