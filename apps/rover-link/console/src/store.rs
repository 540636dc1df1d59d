use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::RwLock;
use rover_link_core::TelemetrySnapshot;
use time::{OffsetDateTime, UtcOffset};

pub const DEFAULT_MAX_LOGS: usize = 50;

/// One line of the unified event history.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: OffsetDateTime,
    pub text: String,
}

impl LogEntry {
    fn now(text: String, offset: UtcOffset) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc().to_offset(offset),
            text,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:02}:{:02}:{:02}] {}",
            self.timestamp.hour(),
            self.timestamp.minute(),
            self.timestamp.second(),
            self.text
        )
    }
}

/// Latest telemetry plus a bounded, append-only history.
///
/// The receive loop writes while renderers read; both the snapshot and the
/// log entry for an update are published under one write lock, so a reader
/// never observes one without the other.
#[derive(Debug)]
pub struct TelemetryStore {
    max_logs: usize,
    /// Offset entries are stamped in. Read once at startup: the local
    /// offset cannot be queried safely once worker threads exist.
    offset: UtcOffset,
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    latest: Option<Arc<TelemetrySnapshot>>,
    log: VecDeque<LogEntry>,
    updates: u64,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOGS)
    }
}

impl TelemetryStore {
    /// A cap of zero is treated as one.
    pub fn new(max_logs: usize) -> Self {
        let max_logs = max_logs.max(1);
        Self {
            max_logs,
            offset: UtcOffset::UTC,
            inner: RwLock::new(StoreInner {
                latest: None,
                log: VecDeque::with_capacity(max_logs),
                updates: 0,
            }),
        }
    }

    /// Stamps entries in `offset` instead of UTC.
    pub fn with_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Replaces the latest snapshot wholesale and records it in the history.
    pub fn apply(&self, snapshot: TelemetrySnapshot) {
        let entry = LogEntry::now(format!("Telemetry: {}", snapshot.summary()), self.offset);
        let mut inner = self.inner.write();
        inner.latest = Some(Arc::new(snapshot));
        inner.updates += 1;
        push_bounded(&mut inner.log, entry, self.max_logs);
    }

    /// Records a non-telemetry event in the same history.
    pub fn append_log(&self, text: impl Into<String>) {
        let entry = LogEntry::now(text.into(), self.offset);
        let mut inner = self.inner.write();
        push_bounded(&mut inner.log, entry, self.max_logs);
    }

    pub fn latest(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.inner.read().latest.clone()
    }

    /// Whole history, most recent first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.read().log.iter().rev().cloned().collect()
    }

    /// Up to `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.inner.read().log.iter().rev().take(limit).cloned().collect()
    }

    pub fn log_len(&self) -> usize {
        self.inner.read().log.len()
    }

    pub fn max_logs(&self) -> usize {
        self.max_logs
    }

    /// Number of snapshots applied so far. Renderers poll this to detect
    /// fresh telemetry.
    pub fn updates(&self) -> u64 {
        self.inner.read().updates
    }
}

fn push_bounded(log: &mut VecDeque<LogEntry>, entry: LogEntry, cap: usize) {
    while log.len() >= cap {
        log.pop_front();
    }
    log.push_back(entry);
}
