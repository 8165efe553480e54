use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use relay_wire::{ChatMessage, FunctionCallSummary};

/// What was asked, captured before the upstream call
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub request_id: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub streaming: bool,
    pub timestamp: DateTime<Utc>,
}

/// What was answered, captured once the exchange completed
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    pub request_id: String,
    pub content: String,

    /// Wall-clock processing time in seconds
    pub processing_time: f64,

    /// Number of deltas forwarded (streaming only)
    pub chunk_count: Option<usize>,

    pub function_calls: Option<FunctionCallSummary>,
    pub streaming: bool,
    pub timestamp: DateTime<Utc>,
}

/// Persistence collaborator for completed exchanges.
///
/// Implementations may fail; callers log the failure and move on. Storage
/// must never affect a response that is already being delivered.
#[async_trait]
pub trait ChatLogStore: Send + Sync {
    async fn log_request(&self, record: RequestRecord) -> anyhow::Result<()>;

    async fn log_response(&self, record: ResponseRecord) -> anyhow::Result<()>;
}

/// One stored entry
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    Request(RequestRecord),
    Response(ResponseRecord),
}

/// Bounded in-memory store, the demo stand-in for a real database.
///
/// Oldest entries are evicted once the capacity is reached.
pub struct MemoryLogStore {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl MemoryLogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot of the stored entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn push(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ChatLogStore for MemoryLogStore {
    async fn log_request(&self, record: RequestRecord) -> anyhow::Result<()> {
        tracing::debug!(
            request_id = %record.request_id,
            messages = record.messages.len(),
            streaming = record.streaming,
            "chat request recorded"
        );
        self.push(LogEntry::Request(record));
        Ok(())
    }

    async fn log_response(&self, record: ResponseRecord) -> anyhow::Result<()> {
        tracing::debug!(
            request_id = %record.request_id,
            response_length = record.content.len(),
            processing_time = record.processing_time,
            "chat response recorded"
        );
        self.push(LogEntry::Response(record));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_record(id: &str) -> RequestRecord {
        RequestRecord {
            request_id: id.to_string(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 1000,
            temperature: 0.7,
            streaming: true,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn keeps_entries_in_arrival_order() {
        let store = MemoryLogStore::new(8);
        store.log_request(request_record("a")).await.unwrap();
        store.log_request(request_record("b")).await.unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], LogEntry::Request(r) if r.request_id == "a"));
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let store = MemoryLogStore::new(2);
        for id in ["a", "b", "c"] {
            store.log_request(request_record(id)).await.unwrap();
        }

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], LogEntry::Request(r) if r.request_id == "b"));
        assert!(matches!(&entries[1], LogEntry::Request(r) if r.request_id == "c"));
    }
}
