// SPDX-License-Identifier: Apache-2.0

//! Interceptor Types
//!
//! Audit records produced while a SQL request moves through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sqlgate_core::limits::AUDIT_QUERY_PREVIEW_CHARS;

/// Who sent a request, as far as the transport can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Rate-limit key: IP and client signature.
    pub fn key(&self) -> String {
        format!("{}-{}", self.ip, self.user_agent)
    }
}

/// Stage of the pipeline an audit entry was recorded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// Emitted before the executor is called
    Request,
    /// Emitted once the executor returned
    Outcome,
    /// A gate refused the request before execution
    Rejected,
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub client_ip: String,
    pub user_agent: String,
    /// First characters of the query text
    pub query_preview: String,
    pub param_count: usize,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub complexity_score: Option<u32>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub row_count: Option<usize>,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
    /// Redacted driver text or rejection reasons; never sent to clients
    #[serde(default)]
    pub error: Option<String>,
}

impl AuditLogEntry {
    pub fn new(event: AuditEvent, client: &ClientInfo, query: &str, param_count: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
            client_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            query_preview: query.chars().take(AUDIT_QUERY_PREVIEW_CHARS).collect(),
            param_count,
            tables: Vec::new(),
            complexity_score: None,
            warnings: Vec::new(),
            status_code: None,
            code: None,
            row_count: None,
            execution_time_ms: None,
            error: None,
        }
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_complexity(mut self, score: u32) -> Self {
        self.complexity_score = Some(score);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_status(mut self, status_code: u16, code: Option<&str>) -> Self {
        self.status_code = Some(status_code);
        self.code = code.map(str::to_string);
        self
    }

    pub fn with_rows(mut self, row_count: usize, execution_time_ms: u64) -> Self {
        self.row_count = Some(row_count);
        self.execution_time_ms = Some(execution_time_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>, execution_time_ms: Option<u64>) -> Self {
        self.error = Some(error.into());
        self.execution_time_ms = execution_time_ms;
        self
    }

    /// Outcome entries with a 2xx status count as successes.
    pub fn succeeded(&self) -> bool {
        self.event == AuditEvent::Outcome
            && self.status_code.is_some_and(|code| (200..300).contains(&code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientInfo {
        ClientInfo::new("10.0.0.1", "curl/8")
    }

    #[test]
    fn test_preview_is_capped() {
        let query = format!("SELECT {}", "x".repeat(800));
        let entry = AuditLogEntry::new(AuditEvent::Request, &client(), &query, 2);
        assert_eq!(entry.query_preview.chars().count(), AUDIT_QUERY_PREVIEW_CHARS);
        assert_eq!(entry.param_count, 2);
    }

    #[test]
    fn test_serializes_camel_case() {
        let entry = AuditLogEntry::new(AuditEvent::Outcome, &client(), "SELECT 1", 0)
            .with_status(200, None)
            .with_rows(1, 4);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["event"], "outcome");
        assert_eq!(value["clientIp"], "10.0.0.1");
        assert_eq!(value["rowCount"], 1);
        assert!(entry.succeeded());
    }

    #[test]
    fn test_client_key() {
        assert_eq!(ClientInfo::new("1.2.3.4", "curl/8").key(), "1.2.3.4-curl/8");
    }
}
