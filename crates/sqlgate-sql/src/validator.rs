// SPDX-License-Identifier: Apache-2.0

//! Static Query Validator
//!
//! Pattern-based security checks over the uppercased query text. This is not
//! a parser: anything that looks dangerous is rejected, so false positives
//! (a column named `updated_at` contains `UPDATE`) are accepted in exchange
//! for no false negatives.

use sqlgate_core::limits::MAX_QUERY_LENGTH;
use sqlgate_core::ValidationResult;

/// Keywords rejected anywhere in the query, as substrings.
pub const DANGEROUS_KEYWORDS: &[&str] = &[
    // Data modification
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE",
    // Procedural invocation
    "EXEC", "EXECUTE", "CALL", "PROCEDURE", "FUNCTION",
    // File operations
    "COPY", "LOAD", "OUTFILE", "INFILE", "IMPORT", "EXPORT",
    // Privileges and session state
    "GRANT", "REVOKE", "SET", "RESET", "SHOW",
    // Transaction control
    "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT",
    // Introspection
    "DESCRIBE", "EXPLAIN", "ANALYZE",
    // PostgreSQL functions and catalogs
    "PG_READ_FILE", "PG_WRITE_FILE", "PG_EXECUTE",
    "PG_SHADOW", "PG_USER", "PG_DATABASE", "PG_TABLES",
];

/// System schemas and catalogs that may not be referenced.
pub const SYSTEM_TABLES: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "pg_shadow",
    "pg_user",
    "pg_database",
    "pg_tables",
    "pg_views",
    "pg_indexes",
    "pg_stat_",
    "pg_settings",
    "pg_roles",
    "pg_authid",
];

/// File I/O, cross-database and arbitrary-execution functions.
pub const DANGEROUS_FUNCTIONS: &[&str] = &[
    "PG_READ_FILE",
    "PG_WRITE_FILE",
    "PG_EXECUTE",
    "COPY_FROM_PROGRAM",
    "DBLINK",
    "PG_STAT_FILE",
    "PG_LS_DIR",
    "PG_READ_BINARY_FILE",
];

const COMMENT_MARKERS: &[&str] = &["--", "/*", "*/"];

/// Markers that flag a subquery as reaching into system information.
const SYSTEM_INFO_MARKERS: &[&str] = &["INFORMATION_SCHEMA", "PG_CATALOG", "PG_"];

/// Validates a raw query against the read-only security policy.
pub fn validate(query: &str) -> ValidationResult {
    let original = query.trim();
    if original.is_empty() {
        return ValidationResult::rejected("Query must be a non-empty string");
    }

    let normalized = original.to_uppercase();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if original.chars().count() > MAX_QUERY_LENGTH {
        errors.push("Query exceeds maximum length of 10,000 characters".to_string());
    }

    if !normalized.starts_with("SELECT") {
        errors.push("Only SELECT statements are allowed".to_string());
    }

    let keywords = find_all(&normalized, DANGEROUS_KEYWORDS);
    if !keywords.is_empty() {
        errors.push(format!("Dangerous keywords detected: {}", keywords.join(", ")));
    }

    let statement_count = original
        .split(';')
        .filter(|statement| !statement.trim().is_empty())
        .count();
    if statement_count > 1 {
        errors.push("Multiple statements are not allowed".to_string());
    }

    if COMMENT_MARKERS.iter().any(|marker| original.contains(marker)) {
        errors.push("Comments are not allowed in queries".to_string());
    }

    let tables: Vec<&str> = SYSTEM_TABLES
        .iter()
        .copied()
        .filter(|table| normalized.contains(&table.to_uppercase()))
        .collect();
    if !tables.is_empty() {
        errors.push(format!(
            "Access to system tables/schemas is not allowed: {}",
            tables.join(", ")
        ));
    }

    if normalized.contains("UNION") {
        errors.push("UNION statements are not allowed".to_string());
    }

    if normalized.contains("(SELECT")
        && SYSTEM_INFO_MARKERS
            .iter()
            .any(|marker| normalized.contains(marker))
    {
        errors.push("Subqueries accessing system information are not allowed".to_string());
    }

    let functions = find_all(&normalized, DANGEROUS_FUNCTIONS);
    if !functions.is_empty() {
        errors.push(format!("Dangerous functions detected: {}", functions.join(", ")));
    }

    if normalized.contains("CROSS JOIN") {
        warnings.push("CROSS JOIN detected - this may be expensive".to_string());
    }

    if normalized.contains("ORDER BY") && !normalized.contains("LIMIT") {
        warnings.push("ORDER BY without LIMIT may be expensive for large datasets".to_string());
    }

    if normalized.contains('~') || normalized.contains("SIMILAR TO") {
        warnings.push("Regular expressions detected - ensure they are not complex".to_string());
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        normalized_query: normalized,
        statement_count,
    }
}

fn find_all<'a>(haystack: &str, needles: &[&'a str]) -> Vec<&'a str> {
    needles
        .iter()
        .copied()
        .filter(|needle| haystack.contains(needle))
        .collect()
}
