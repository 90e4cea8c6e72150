// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-memory request metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    executed: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    rejected: AtomicU64,
    rate_limited: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Queries handed to the database, successful or not
    pub executed: u64,
    pub failed: u64,
    pub timeouts: u64,
    /// Requests stopped by a validation gate
    pub rejected: u64,
    pub rate_limited: u64,
    pub avg_execution_ms: Option<f64>,
    pub max_execution_ms: Option<u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, duration_ms: u64, success: bool) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.duration_total_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.duration_max_ms
            .fetch_max(duration_ms, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let executed = self.executed.load(Ordering::Relaxed);
        let duration_total = self.duration_total_ms.load(Ordering::Relaxed);
        let max_ms = self.duration_max_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            executed,
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            avg_execution_ms: (executed > 0).then(|| duration_total as f64 / executed as f64),
            max_execution_ms: (executed > 0).then_some(max_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_flow() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().avg_execution_ms, None);

        metrics.record_query(100, true);
        metrics.record_query(50, false);
        metrics.record_timeout();
        metrics.record_rejection();
        metrics.record_rate_limited();
        metrics.record_rate_limited();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.executed, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.rate_limited, 2);
        assert_eq!(snapshot.avg_execution_ms, Some(75.0));
        assert_eq!(snapshot.max_execution_ms, Some(100));
    }
}
