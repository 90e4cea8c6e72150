// SPDX-License-Identifier: Apache-2.0

//! Query analysis and execution types.
//!
//! Every value here is created per request and never persisted.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::limits::{clamp_max_rows, clamp_timeout_ms};

/// A single result row, keyed by column name in column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Outcome of the static security validation of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Policy violations, in detection order
    pub errors: Vec<String>,
    /// Advisory findings that do not block execution
    pub warnings: Vec<String>,
    /// Trimmed, uppercased copy used for pattern matching
    pub normalized_query: String,
    /// Number of non-empty `;`-separated statements
    pub statement_count: usize,
}

impl ValidationResult {
    /// A result rejected before any pattern analysis took place.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
            normalized_query: String::new(),
            statement_count: 0,
        }
    }
}

/// Heuristic cost estimate of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityAssessment {
    pub score: u32,
    pub issues: Vec<String>,
    pub is_complex: bool,
}

/// Column metadata of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: CompactString,
    /// Driver type identifier (PostgreSQL type OID)
    #[serde(rename = "type")]
    pub type_id: Option<u32>,
    pub type_name: CompactString,
}

/// Shaped result of one executed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Record>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub truncated: bool,
    pub fields: Vec<FieldInfo>,
}

impl QueryResult {
    pub fn new(rows: Vec<Record>, fields: Vec<FieldInfo>, execution_time_ms: u64) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            execution_time_ms,
            truncated: false,
            fields,
        }
    }

    /// Caps the row list at `max_rows`.
    ///
    /// The query has already run in full at this point, so this bounds the
    /// response size only.
    pub fn truncate_to(mut self, max_rows: usize) -> Self {
        if self.rows.len() > max_rows {
            self.rows.truncate(max_rows);
            self.truncated = true;
        }
        self.row_count = self.rows.len();
        self
    }
}

/// Per-call execution bounds, always within the hard limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    pub timeout_ms: u64,
    pub max_rows: usize,
}

impl ExecuteOptions {
    pub fn new(timeout_ms: u64, max_rows: usize) -> Self {
        Self {
            timeout_ms: clamp_timeout_ms(timeout_ms),
            max_rows: clamp_max_rows(max_rows),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Active,
    NotInitialized,
    Closed,
}

/// Occupancy snapshot of the connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub status: PoolStatus,
    /// Open connections, idle or in use
    pub total_count: u32,
    pub idle_count: u32,
    pub max_connections: u32,
}

impl PoolStats {
    pub fn not_initialized() -> Self {
        Self {
            status: PoolStatus::NotInitialized,
            total_count: 0,
            idle_count: 0,
            max_connections: 0,
        }
    }

    pub fn in_use(&self) -> u32 {
        self.total_count.saturating_sub(self.idle_count)
    }
}

/// Result of a connectivity probe against the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProbe {
    pub timestamp: String,
    pub version: String,
    pub pool_stats: PoolStats,
}
