// Sync Scheduler Port
// Binds queues to the platform's tagged reconnect signal

use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Sync registration errors. Never fatal to a push: callers swallow
/// these and carry on.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync events are not supported on this platform")]
    Unsupported,

    #[error("Sync registration denied: {0}")]
    Denied(String),
}

/// Handler invoked when a sync event matching a registered tag fires.
/// The returned future is awaited by the event source before the event
/// is considered complete (the `waitUntil` contract).
pub type SyncHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Capability seam for the platform's background-sync primitive.
///
/// Platforms with the tagged reconnect signal report `is_supported() ==
/// true`, accept idempotent tag registrations, and deliver events to
/// listeners filtered by exact tag equality. Platforms without it report
/// false; queues then fall back to one immediate best-effort replay at
/// construction time.
#[async_trait]
pub trait SyncScheduler: Send + Sync {
    /// Whether tagged sync events are delivered at all
    fn is_supported(&self) -> bool;

    /// Register interest in a tag. Idempotent; may fail (denied), and
    /// failure is non-fatal to the caller.
    async fn register(&self, tag: &str) -> std::result::Result<(), SyncError>;

    /// Attach a listener for events carrying exactly `tag`
    fn add_listener(&self, tag: String, handler: SyncHandler);
}

/// In-process sync event source.
///
/// `dispatch_sync(tag)` fires every listener registered for that exact
/// tag and resolves only once each handler's future has completed, so a
/// caller awaiting the dispatch knows replay has finished. Listeners
/// with other tags are untouched.
pub struct LocalSyncHub {
    listeners: Mutex<Vec<(String, SyncHandler)>>,
    registered_tags: Mutex<HashSet<String>>,
}

impl LocalSyncHub {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            registered_tags: Mutex::new(HashSet::new()),
        }
    }

    /// Deliver a tagged sync event, awaiting handler completion.
    ///
    /// Handlers that end a replay pass early on a network failure still
    /// resolve Ok; only store or serialization crashes surface here.
    pub async fn dispatch_sync(&self, tag: &str) -> Result<()> {
        let matching: Vec<SyncHandler> = {
            let listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
            listeners
                .iter()
                .filter(|(t, _)| t == tag)
                .map(|(_, h)| Arc::clone(h))
                .collect()
        };

        tracing::debug!(tag = %tag, handlers = matching.len(), "dispatching sync event");

        for handler in matching {
            handler().await?;
        }
        Ok(())
    }

    /// Tags registered so far (diagnostics/tests)
    pub fn registered_tags(&self) -> Vec<String> {
        let tags = self.registered_tags.lock().unwrap_or_else(|p| p.into_inner());
        tags.iter().cloned().collect()
    }
}

impl Default for LocalSyncHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncScheduler for LocalSyncHub {
    fn is_supported(&self) -> bool {
        true
    }

    async fn register(&self, tag: &str) -> std::result::Result<(), SyncError> {
        let mut tags = self.registered_tags.lock().unwrap_or_else(|p| p.into_inner());
        tags.insert(tag.to_string());
        Ok(())
    }

    fn add_listener(&self, tag: String, handler: SyncHandler) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
        listeners.push((tag, handler));
    }
}

/// Scheduler for platforms without the reconnect signal. Queues seeing
/// `is_supported() == false` run one best-effort replay at construction
/// instead of waiting for an event that will never come.
pub struct UnsupportedSyncScheduler;

#[async_trait]
impl SyncScheduler for UnsupportedSyncScheduler {
    fn is_supported(&self) -> bool {
        false
    }

    async fn register(&self, _tag: &str) -> std::result::Result<(), SyncError> {
        Err(SyncError::Unsupported)
    }

    fn add_listener(&self, _tag: String, _handler: SyncHandler) {}
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Reports support but denies every registration (simulates a user
    /// rejecting the background-sync permission).
    pub struct DenyingSyncScheduler;

    #[async_trait]
    impl SyncScheduler for DenyingSyncScheduler {
        fn is_supported(&self) -> bool {
            true
        }

        async fn register(&self, tag: &str) -> std::result::Result<(), SyncError> {
            Err(SyncError::Denied(format!("registration denied for {}", tag)))
        }

        fn add_listener(&self, _tag: String, _handler: SyncHandler) {}
    }
}
