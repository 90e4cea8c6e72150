// SPDX-License-Identifier: Apache-2.0

//! Best-effort table name extraction for the validation report.

use std::sync::OnceLock;

use regex::Regex;

static TABLE_REFERENCE: OnceLock<Option<Regex>> = OnceLock::new();

fn table_reference() -> Option<&'static Regex> {
    TABLE_REFERENCE
        .get_or_init(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_]*)").ok())
        .as_ref()
}

/// Identifiers following `FROM` or `JOIN`, de-duplicated in order of first
/// appearance. Schema-qualified names yield the schema part only.
pub fn extract_table_names(query: &str) -> Vec<String> {
    let Some(pattern) = table_reference() else {
        return Vec::new();
    };

    let mut tables: Vec<String> = Vec::new();
    for captures in pattern.captures_iter(query) {
        if let Some(name) = captures.get(1) {
            if !tables.iter().any(|t| t == name.as_str()) {
                tables.push(name.as_str().to_string());
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_and_join_in_order() {
        let tables = extract_table_names(
            "SELECT * FROM orders o JOIN customers c ON c.id = o.customer_id \
             LEFT JOIN orders x ON true",
        );
        assert_eq!(tables, vec!["orders", "customers"]);
    }

    #[test]
    fn test_case_insensitive_keywords() {
        assert_eq!(extract_table_names("select 1 from Items"), vec!["Items"]);
    }

    #[test]
    fn test_no_tables() {
        assert!(extract_table_names("SELECT 1").is_empty());
        assert!(extract_table_names("SELECT * FROM (SELECT 1) s").is_empty());
    }

    #[test]
    fn test_qualified_name_yields_schema() {
        assert_eq!(extract_table_names("SELECT * FROM sales.orders"), vec!["sales"]);
    }
}
