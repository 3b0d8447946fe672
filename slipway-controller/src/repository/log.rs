//! Log Store
//!
//! Append-only per-stage log buffers. Readers keep their own offset and ask
//! for entries beyond it, which serves both full retrieval and live tailing.

use slipway_core::domain::execution::PipelineExecution;
use slipway_core::domain::log::{LogEntry, LogLevel};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Maximum length of a single stored message
const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Maximum entries kept per log; later writes are dropped with a marker
const MAX_ENTRIES_PER_LOG: usize = 50_000;

#[derive(Default)]
pub struct LogStore {
    logs: RwLock<HashMap<Uuid, Vec<LogEntry>>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry; oversized messages are truncated
    pub async fn append(&self, log_id: Uuid, mut entry: LogEntry) {
        if entry.message.len() > MAX_MESSAGE_LENGTH {
            let mut cut = MAX_MESSAGE_LENGTH;
            while !entry.message.is_char_boundary(cut) {
                cut -= 1;
            }
            entry.message.truncate(cut);
            entry.message.push_str(" [truncated]");
        }

        let mut logs = self.logs.write().await;
        let entries = logs.entry(log_id).or_default();
        match entries.len() {
            n if n < MAX_ENTRIES_PER_LOG => entries.push(entry),
            n if n == MAX_ENTRIES_PER_LOG => entries.push(LogEntry::new(
                LogLevel::Warning,
                "log limit reached, further output dropped",
            )),
            _ => {}
        }
    }

    /// Entries at or after `offset`, plus the offset to use next time
    pub async fn read_from(&self, log_id: Uuid, offset: usize) -> (Vec<LogEntry>, usize) {
        let logs = self.logs.read().await;
        match logs.get(&log_id) {
            Some(entries) if offset < entries.len() => {
                (entries[offset..].to_vec(), entries.len())
            }
            Some(entries) => (Vec::new(), entries.len()),
            None => (Vec::new(), offset),
        }
    }

    pub async fn read_all(&self, log_id: Uuid) -> Vec<LogEntry> {
        self.read_from(log_id, 0).await.0
    }

    /// Drops the stage logs of executions removed from history; returns
    /// how many logs existed
    pub async fn remove_stage_logs(&self, executions: &[PipelineExecution]) -> usize {
        let mut logs = self.logs.write().await;
        executions
            .iter()
            .flat_map(|e| e.stages.iter().map(|s| s.log_id))
            .filter(|id| logs.remove(id).is_some())
            .count()
    }

    /// Handle bound to one log id
    pub fn writer(self: &Arc<Self>, log_id: Uuid) -> LogWriter {
        LogWriter {
            store: Arc::clone(self),
            log_id,
        }
    }
}

/// Append-only handle owned by one stage execution
#[derive(Clone)]
pub struct LogWriter {
    store: Arc<LogStore>,
    log_id: Uuid,
}

impl LogWriter {
    pub fn log_id(&self) -> Uuid {
        self.log_id
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.store
            .append(self.log_id, LogEntry::new(level, message))
            .await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offset_reads_only_new_entries() {
        let store = Arc::new(LogStore::new());
        let writer = store.writer(Uuid::new_v4());
        writer.info("one").await;
        writer.info("two").await;

        let (first, offset) = store.read_from(writer.log_id(), 0).await;
        assert_eq!(first.len(), 2);
        assert_eq!(offset, 2);

        writer.error("three").await;
        let (next, offset) = store.read_from(writer.log_id(), offset).await;
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].message, "three");
        assert_eq!(next[0].level, LogLevel::Error);
        assert_eq!(offset, 3);

        let (none, offset) = store.read_from(writer.log_id(), offset).await;
        assert!(none.is_empty());
        assert_eq!(offset, 3);
    }

    #[tokio::test]
    async fn test_long_messages_are_truncated() {
        let store = LogStore::new();
        let id = Uuid::new_v4();
        store
            .append(id, LogEntry::new(LogLevel::Info, "x".repeat(20_000)))
            .await;

        let entries = store.read_all(id).await;
        assert!(entries[0].message.len() < 10_100);
        assert!(entries[0].message.ends_with("[truncated]"));
    }
}
