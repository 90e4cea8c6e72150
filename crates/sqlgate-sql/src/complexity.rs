// SPDX-License-Identifier: Apache-2.0

//! Heuristic cost scoring.

use sqlgate_core::ComplexityAssessment;

/// Scores above this are flagged `is_complex` by the scorer itself.
pub const COMPLEX_SCORE: u32 = 10;

const JOIN_WEIGHT: u32 = 2;
const SUBQUERY_WEIGHT: u32 = 3;
const LEADING_WILDCARD_WEIGHT: u32 = 5;
const EXPENSIVE_FUNCTION_WEIGHT: u32 = 2;

const MAX_JOINS_BEFORE_ISSUE: usize = 5;
const MAX_SUBQUERIES_BEFORE_ISSUE: usize = 3;

/// Each family adds its weight once, however often it appears.
pub const EXPENSIVE_FUNCTIONS: &[&str] = &["REGEXP", "SIMILAR TO", "SUBSTRING", "POSITION"];

/// Scores a query's estimated execution cost. Never fails.
pub fn assess(query: &str) -> ComplexityAssessment {
    let normalized = query.to_uppercase();
    let mut score = 0u32;
    let mut issues = Vec::new();

    let joins = normalized.matches("JOIN").count();
    score = score.saturating_add(weighted(joins, JOIN_WEIGHT));
    if joins > MAX_JOINS_BEFORE_ISSUE {
        issues.push(format!("High number of JOINs detected: {joins}"));
    }

    let subqueries = normalized.matches("(SELECT").count();
    score = score.saturating_add(weighted(subqueries, SUBQUERY_WEIGHT));
    if subqueries > MAX_SUBQUERIES_BEFORE_ISSUE {
        issues.push(format!("High number of subqueries detected: {subqueries}"));
    }

    if normalized.contains("LIKE '%") {
        score = score.saturating_add(LEADING_WILDCARD_WEIGHT);
        issues.push("LIKE with leading wildcard detected - may be slow".to_string());
    }

    for function in EXPENSIVE_FUNCTIONS {
        if normalized.contains(function) {
            score = score.saturating_add(EXPENSIVE_FUNCTION_WEIGHT);
            issues.push(format!("Potentially expensive function detected: {function}"));
        }
    }

    ComplexityAssessment {
        score,
        issues,
        is_complex: score > COMPLEX_SCORE,
    }
}

fn weighted(count: usize, weight: u32) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX).saturating_mul(weight)
}

/// What the request pipeline does with an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityVerdict {
    Accept,
    /// Execute, but surface a warning to the caller and the audit log.
    Advisory,
    Reject,
}

/// Warn/reject thresholds, both exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexityPolicy {
    pub warn_threshold: u32,
    pub reject_threshold: u32,
}

impl Default for ComplexityPolicy {
    fn default() -> Self {
        Self {
            warn_threshold: 10,
            reject_threshold: 20,
        }
    }
}

impl ComplexityPolicy {
    pub fn verdict(&self, assessment: &ComplexityAssessment) -> ComplexityVerdict {
        if assessment.score > self.reject_threshold {
            ComplexityVerdict::Reject
        } else if assessment.score > self.warn_threshold {
            ComplexityVerdict::Advisory
        } else {
            ComplexityVerdict::Accept
        }
    }
}
