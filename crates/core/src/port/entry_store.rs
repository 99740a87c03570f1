// Entry Store Port (Interface)
// Durable, ordered, partitioned storage of queue entries

use crate::domain::{NewEntry, QueueEntry};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for durable queue entries.
///
/// Implementations partition a shared physical store by `queue_name`:
/// two queues with different names never observe each other's entries.
/// Assigned ids are strictly increasing per partition and never reused,
/// even after deletion, so ascending id order is FIFO enqueue order.
/// Every mutation is durable before the call returns.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Append an entry at the tail of its partition, returning the
    /// assigned id. Fails with `InvalidEntry` if the request snapshot
    /// lacks a method or url.
    async fn push_entry(&self, entry: NewEntry) -> Result<i64>;

    /// Remove and return the entry with the smallest id in the
    /// partition, or `None` if the partition is empty.
    async fn shift_entry(&self, queue_name: &str) -> Result<Option<QueueEntry>>;

    /// All entries in the partition, ascending id order, non-destructive
    async fn get_all(&self, queue_name: &str) -> Result<Vec<QueueEntry>>;

    /// Remove exactly one entry by id; a no-op if the id is absent
    async fn delete_entry(&self, id: i64) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::DomainError;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Mutex;

    /// In-memory entry store for unit tests. Mirrors the SQLite adapter's
    /// observable behavior: monotonic ids, per-queue partitions, FIFO shift.
    pub struct MemoryEntryStore {
        entries: Mutex<Vec<QueueEntry>>,
        next_id: AtomicI64,
        fail_next_push: AtomicBool,
    }

    impl MemoryEntryStore {
        pub fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicI64::new(1),
                fail_next_push: AtomicBool::new(false),
            }
        }

        /// Make the next push_entry fail with a Database error (simulates
        /// a store crash mid-replay).
        pub fn fail_next_push(&self) {
            self.fail_next_push.store(true, Ordering::SeqCst);
        }

        pub fn len(&self) -> usize {
            self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl Default for MemoryEntryStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl EntryStore for MemoryEntryStore {
        async fn push_entry(&self, entry: NewEntry) -> Result<i64> {
            if self.fail_next_push.swap(false, Ordering::SeqCst) {
                return Err(AppError::Database("simulated store failure".to_string()));
            }
            if !entry.request_data.is_valid() {
                return Err(DomainError::InvalidEntry(
                    "entry request data must have a method and url".to_string(),
                )
                .into());
            }

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            entries.push(QueueEntry {
                id,
                queue_name: entry.queue_name,
                request_data: entry.request_data,
                timestamp: entry.timestamp,
                metadata: entry.metadata,
            });
            Ok(id)
        }

        async fn shift_entry(&self, queue_name: &str) -> Result<Option<QueueEntry>> {
            let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            // Entries are appended with increasing ids, so the first match
            // is the smallest id in the partition.
            let position = entries.iter().position(|e| e.queue_name == queue_name);
            Ok(position.map(|i| entries.remove(i)))
        }

        async fn get_all(&self, queue_name: &str) -> Result<Vec<QueueEntry>> {
            let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            Ok(entries
                .iter()
                .filter(|e| e.queue_name == queue_name)
                .cloned()
                .collect())
        }

        async fn delete_entry(&self, id: i64) -> Result<()> {
            let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            entries.retain(|e| e.id != id);
            Ok(())
        }
    }

}
