// SPDX-License-Identifier: Apache-2.0

//! Hard bounds applied to every SQL request.

/// Maximum query length, in characters.
pub const MAX_QUERY_LENGTH: usize = 10_000;

/// Maximum length of a single stringified bind parameter, in characters.
pub const MAX_PARAMETER_LENGTH: usize = 1_000;

pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;

pub const MIN_MAX_ROWS: usize = 1;
pub const MAX_MAX_ROWS: usize = 10_000;

/// Request bodies above this size are refused with 413.
pub const MAX_REQUEST_BYTES: usize = 50 * 1024;

/// Number of query characters kept in audit log entries.
pub const AUDIT_QUERY_PREVIEW_CHARS: usize = 500;

pub fn clamp_timeout_ms(timeout_ms: u64) -> u64 {
    timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
}

pub fn clamp_max_rows(max_rows: usize) -> usize {
    max_rows.clamp(MIN_MAX_ROWS, MAX_MAX_ROWS)
}
