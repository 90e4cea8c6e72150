// SPDX-License-Identifier: Apache-2.0

//! Audit Log Store
//!
//! Keeps the most recent entries in memory, mirrors each one to the
//! `sql_audit` tracing target and, when a path is configured, appends it as
//! a JSON line from a background writer task. Recording never blocks the
//! request: a full writer queue drops the file copy of the entry.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::types::{AuditEvent, AuditLogEntry};

/// Entries kept in memory
pub const MEMORY_CACHE_SIZE: usize = 1000;

/// Pending entries for the file writer
const WRITER_QUEUE_SIZE: usize = 1024;

pub struct AuditStore {
    entries: RwLock<VecDeque<AuditLogEntry>>,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<AuditLogEntry>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AuditStore {
    /// Memory-only store.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(MEMORY_CACHE_SIZE))),
            capacity: capacity.max(1),
            sender: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Store that also appends every entry to `path` as JSON lines.
    ///
    /// Must be called within a Tokio runtime.
    pub fn with_file(path: &Path, capacity: usize) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let (tx, rx) = mpsc::channel(WRITER_QUEUE_SIZE);
        let handle = tokio::spawn(write_entries(
            tokio::fs::File::from_std(file),
            path.to_path_buf(),
            rx,
        ));

        info!(path = %path.display(), "Audit log persistence enabled");

        let store = Self::new(capacity);
        *store.sender.lock() = Some(tx);
        *store.writer.lock() = Some(handle);
        Ok(store)
    }

    pub fn log(&self, entry: AuditLogEntry) {
        emit(&entry);

        if let Some(sender) = self.sender.lock().as_ref() {
            if let Err(err) = sender.try_send(entry.clone()) {
                warn!(id = %entry.id, error = %err, "Audit entry not persisted");
            }
        }

        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> AuditStats {
        let entries = self.entries.read();
        let last_hour = Utc::now() - Duration::hours(1);

        let mut stats = AuditStats::default();
        for entry in entries.iter() {
            stats.total += 1;
            match entry.event {
                AuditEvent::Request => {}
                AuditEvent::Outcome if entry.succeeded() => stats.succeeded += 1,
                AuditEvent::Outcome => stats.failed += 1,
                AuditEvent::Rejected => stats.rejected += 1,
            }
            if entry.timestamp >= last_hour {
                stats.last_hour += 1;
            }
        }
        stats
    }

    /// Flushes and stops the file writer. Later entries stay in memory only.
    pub async fn close(&self) {
        self.sender.lock().take();
        let handle = self.writer.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "Audit writer task failed");
            }
        }
    }
}

/// Aggregate counts over the in-memory entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub last_hour: u64,
}

fn emit(entry: &AuditLogEntry) {
    match entry.event {
        AuditEvent::Request => info!(
            target: "sql_audit",
            id = %entry.id,
            client_ip = %entry.client_ip,
            user_agent = %entry.user_agent,
            query = %entry.query_preview,
            param_count = entry.param_count,
            complexity = ?entry.complexity_score,
            warnings = ?entry.warnings,
            "SQL query request"
        ),
        AuditEvent::Outcome => info!(
            target: "sql_audit",
            id = %entry.id,
            client_ip = %entry.client_ip,
            status = ?entry.status_code,
            row_count = ?entry.row_count,
            execution_time_ms = ?entry.execution_time_ms,
            error = ?entry.error,
            "SQL query completed"
        ),
        AuditEvent::Rejected => warn!(
            target: "sql_audit",
            id = %entry.id,
            client_ip = %entry.client_ip,
            query = %entry.query_preview,
            status = ?entry.status_code,
            code = ?entry.code,
            error = ?entry.error,
            "SQL query rejected"
        ),
    }
}

async fn write_entries(
    mut file: tokio::fs::File,
    path: PathBuf,
    mut rx: mpsc::Receiver<AuditLogEntry>,
) {
    while let Some(entry) = rx.recv().await {
        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(err) => {
                error!(id = %entry.id, error = %err, "Failed to serialize audit entry");
                continue;
            }
        };
        line.push(b'\n');

        if let Err(err) = file.write_all(&line).await {
            error!(path = %path.display(), error = %err, "Failed to write audit log entry");
        }
    }

    if let Err(err) = file.flush().await {
        error!(path = %path.display(), error = %err, "Failed to flush audit log");
    }
}
