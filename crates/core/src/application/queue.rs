// Request Queue - durable FIFO of failed requests awaiting replay

use crate::domain::{sync_tag, DomainError, NewEntry, QueueEntry, RequestSnapshot};
use crate::error::{AppError, Result};
use crate::port::{
    DispatchError, EntryStore, RequestDispatcher, SyncHandler, SyncScheduler, TimeProvider,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::registry::QueueRegistry;

/// Argument passed to a custom `on_sync` handler
pub struct SyncContext {
    pub queue: Arc<Queue>,
}

/// Custom sync handler. When supplied it runs instead of the default
/// `replay_requests` and assumes full responsibility for draining.
pub type OnSync = Box<dyn Fn(SyncContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Input to `push_request`
pub struct PushRequest {
    pub request: RequestSnapshot,
    /// Enqueue time in epoch ms; defaults to the current time
    pub timestamp: Option<i64>,
    /// Opaque caller data, passed through to replay unmodified
    pub metadata: Option<serde_json::Value>,
}

impl PushRequest {
    pub fn new(request: RequestSnapshot) -> Self {
        Self {
            request,
            timestamp: None,
            metadata: None,
        }
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Construction options for a queue. The injected ports default to
/// nothing; store, dispatcher and scheduler are always explicit.
pub struct QueueOptions {
    store: Arc<dyn EntryStore>,
    dispatcher: Arc<dyn RequestDispatcher>,
    scheduler: Arc<dyn SyncScheduler>,
    time_provider: Arc<dyn TimeProvider>,
    registry: Option<Arc<QueueRegistry>>,
    on_sync: Option<OnSync>,
    max_retention_ms: Option<i64>,
}

impl QueueOptions {
    pub fn new(
        store: Arc<dyn EntryStore>,
        dispatcher: Arc<dyn RequestDispatcher>,
        scheduler: Arc<dyn SyncScheduler>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            scheduler,
            time_provider: Arc::new(crate::port::time_provider::SystemTimeProvider),
            registry: None,
            on_sync: None,
            max_retention_ms: None,
        }
    }

    pub fn time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// Registry to claim the name in; defaults to the process-wide one
    pub fn registry(mut self, registry: Arc<QueueRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn on_sync(mut self, on_sync: OnSync) -> Self {
        self.on_sync = Some(on_sync);
        self
    }

    /// Entries older than this (ms since enqueue) are dropped at replay
    /// time without a network attempt. Default: unlimited.
    pub fn max_retention_ms(mut self, max_retention_ms: i64) -> Self {
        self.max_retention_ms = Some(max_retention_ms);
        self
    }
}

/// Named, durable FIFO of failed requests awaiting replay.
///
/// A queue exclusively owns its partition of the entry store. Replay is
/// driven by the sync scheduler: on supported platforms the queue
/// listens for the tag `workbox-background-sync:<name>`; otherwise one
/// best-effort replay runs right after construction.
pub struct Queue {
    name: String,
    tag: String,
    store: Arc<dyn EntryStore>,
    dispatcher: Arc<dyn RequestDispatcher>,
    scheduler: Arc<dyn SyncScheduler>,
    time_provider: Arc<dyn TimeProvider>,
    on_sync: Option<OnSync>,
    max_retention_ms: Option<i64>,
    // Held for a whole drain pass; overlapping triggers queue up behind
    // it instead of shifting entries concurrently.
    replay_lock: Mutex<()>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("max_retention_ms", &self.max_retention_ms)
            .finish_non_exhaustive()
    }
}

impl Queue {
    /// Create a queue and wire its replay trigger.
    ///
    /// The name is claimed in the registry synchronously; a second live
    /// queue with the same name fails with `DuplicateQueueName`. Must be
    /// called within a tokio runtime (the unsupported-platform fallback
    /// spawns the initial replay).
    pub fn new(name: impl Into<String>, options: QueueOptions) -> Result<Arc<Self>> {
        let name = name.into();

        match &options.registry {
            Some(registry) => registry.register(&name)?,
            None => QueueRegistry::global().register(&name)?,
        }

        let queue = Arc::new(Self {
            tag: sync_tag(&name),
            name,
            store: options.store,
            dispatcher: options.dispatcher,
            scheduler: options.scheduler,
            time_provider: options.time_provider,
            on_sync: options.on_sync,
            max_retention_ms: options.max_retention_ms,
            replay_lock: Mutex::new(()),
        });

        if queue.scheduler.is_supported() {
            queue.add_sync_listener();
        } else {
            // No reconnect signal on this platform: try once right away,
            // asynchronously and unforced.
            let initial = Arc::clone(&queue);
            tokio::spawn(async move {
                if let Err(err) = initial.process_sync().await {
                    warn!(queue = %initial.name, error = %err, "initial replay attempt failed");
                }
            });
        }

        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sync tag this queue listens on
    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn add_sync_listener(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handler: SyncHandler = Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(queue) => queue.process_sync().await,
                    None => Ok(()),
                }
            })
        });
        self.scheduler.add_listener(self.tag.clone(), handler);
    }

    /// Serialize and durably append a failed request.
    ///
    /// The timestamp defaults to now. After a successful append the sync
    /// tag is (re-)registered; registration failure is swallowed, the
    /// push itself still succeeds. No network attempt happens here.
    pub async fn push_request(&self, push: PushRequest) -> Result<()> {
        if !push.request.is_valid() {
            return Err(DomainError::InvalidRequest(
                "request must have a method and url".to_string(),
            )
            .into());
        }

        let timestamp = push
            .timestamp
            .unwrap_or_else(|| self.time_provider.now_millis());

        let entry = NewEntry {
            queue_name: self.name.clone(),
            request_data: push.request,
            timestamp,
            metadata: push.metadata,
        };

        let id = self.store.push_entry(entry).await?;
        debug!(queue = %self.name, entry_id = %id, "request queued for replay");

        self.register_sync().await;
        Ok(())
    }

    /// All pending entries, ascending id order, non-destructive
    pub async fn get_all_entries(&self) -> Result<Vec<QueueEntry>> {
        self.store.get_all(&self.name).await
    }

    /// Run the sync trigger logic: the custom `on_sync` handler when one
    /// was supplied, the default replay otherwise.
    pub async fn process_sync(self: &Arc<Self>) -> Result<()> {
        match &self.on_sync {
            Some(handler) => {
                handler(SyncContext {
                    queue: Arc::clone(self),
                })
                .await
            }
            None => self.replay_requests().await,
        }
    }

    /// Drain the queue in FIFO order, re-issuing each stored request.
    ///
    /// Any settled response, whatever its status, dequeues the entry.
    /// A transport-level failure re-persists the shifted entry (original
    /// timestamp and metadata, fresh id) and stops the pass; remaining
    /// entries wait for the next trigger. Entries past the retention
    /// window are dropped without an attempt. Returns Ok even when the
    /// pass stopped early on a network failure; only store or
    /// serialization crashes propagate.
    pub async fn replay_requests(&self) -> Result<()> {
        let _pass = self.replay_lock.lock().await;

        info!(queue = %self.name, "replaying queued requests");
        let mut replayed = 0usize;

        loop {
            let Some(entry) = self.store.shift_entry(&self.name).await? else {
                break;
            };

            if self.is_expired(&entry) {
                debug!(
                    queue = %self.name,
                    entry_id = %entry.id,
                    "entry exceeded retention window, dropping without replay"
                );
                continue;
            }

            match self.dispatcher.dispatch(&entry.request_data).await {
                Ok(receipt) => {
                    replayed += 1;
                    debug!(
                        queue = %self.name,
                        entry_id = %entry.id,
                        status = %receipt.status,
                        "request replayed"
                    );
                }
                Err(DispatchError::Network(reason)) => {
                    warn!(
                        queue = %self.name,
                        entry_id = %entry.id,
                        reason = %reason,
                        "network failure during replay, requeueing and stopping pass"
                    );
                    // Re-persist before stopping: a network failure never
                    // loses an entry.
                    self.store.push_entry(NewEntry::from_entry(entry)).await?;
                    break;
                }
                Err(err @ DispatchError::Malformed(_)) => {
                    return Err(AppError::Internal(format!(
                        "stored request cannot be rebuilt: {}",
                        err
                    )));
                }
            }
        }

        info!(queue = %self.name, replayed = replayed, "replay pass finished");
        Ok(())
    }

    fn is_expired(&self, entry: &QueueEntry) -> bool {
        match self.max_retention_ms {
            Some(max) => self.time_provider.now_millis() - entry.timestamp > max,
            None => false,
        }
    }

    async fn register_sync(&self) {
        if !self.scheduler.is_supported() {
            return;
        }
        if let Err(err) = self.scheduler.register(&self.tag).await {
            // Non-fatal: the push already succeeded.
            debug!(queue = %self.name, tag = %self.tag, error = %err, "sync registration unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::entry_store::mocks::MemoryEntryStore;
    use crate::port::request_dispatcher::mocks::{MockDispatcher, MockOutcome};
    use crate::port::sync_scheduler::mocks::DenyingSyncScheduler;
    use crate::port::sync_scheduler::{LocalSyncHub, UnsupportedSyncScheduler};
    use crate::port::time_provider::FixedTimeProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        store: Arc<MemoryEntryStore>,
        dispatcher: Arc<MockDispatcher>,
        hub: Arc<LocalSyncHub>,
        registry: Arc<QueueRegistry>,
    }

    impl Harness {
        fn new(dispatcher: MockDispatcher) -> Self {
            Self {
                store: Arc::new(MemoryEntryStore::new()),
                dispatcher: Arc::new(dispatcher),
                hub: Arc::new(LocalSyncHub::new()),
                registry: Arc::new(QueueRegistry::new()),
            }
        }

        fn options(&self) -> QueueOptions {
            QueueOptions::new(
                self.store.clone(),
                self.dispatcher.clone(),
                self.hub.clone(),
            )
            .registry(self.registry.clone())
        }

        fn queue(&self, name: &str) -> Arc<Queue> {
            Queue::new(name, self.options()).unwrap()
        }
    }

    fn snapshot(url: &str) -> RequestSnapshot {
        RequestSnapshot::get(url)
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_while_first_is_live() {
        let harness = Harness::new(MockDispatcher::new());
        let _foo = harness.queue("foo");
        let _bar = harness.queue("bar");

        let err = Queue::new("foo", harness.options()).unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::DuplicateQueueName(name)) if name == "foo"
        ));

        // A fresh name still works
        let _baz = harness.queue("baz");
    }

    #[tokio::test]
    async fn test_push_stores_entry_with_timestamp_and_metadata() {
        let harness = Harness::new(MockDispatcher::new());
        let queue = harness.queue("a");

        let request = RequestSnapshot::new("POST", "https://example.com/api")
            .header("x-foo", "bar")
            .mode("cors")
            .body("testing...");

        queue
            .push_request(
                PushRequest::new(request.clone())
                    .timestamp(1234)
                    .metadata(serde_json::json!({"meta": "data"})),
            )
            .await
            .unwrap();

        let entries = queue.get_all_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request_data.url, "https://example.com/api");
        assert_eq!(entries[0].request_data.method, "POST");
        assert_eq!(entries[0].request_data.header_value("x-foo"), Some("bar"));
        assert_eq!(entries[0].request_data.mode.as_deref(), Some("cors"));
        assert_eq!(entries[0].timestamp, 1234);
        assert_eq!(
            entries[0].metadata,
            Some(serde_json::json!({"meta": "data"}))
        );
    }

    #[tokio::test]
    async fn test_push_defaults_timestamp_to_current_time() {
        let harness = Harness::new(MockDispatcher::new());
        let queue = Queue::new(
            "a",
            harness
                .options()
                .time_provider(Arc::new(FixedTimeProvider(1234))),
        )
        .unwrap();

        queue
            .push_request(PushRequest::new(snapshot("https://example.com")))
            .await
            .unwrap();

        let entries = queue.get_all_entries().await.unwrap();
        assert_eq!(entries[0].timestamp, 1234);
        assert_eq!(entries[0].metadata, None);
    }

    #[tokio::test]
    async fn test_push_rejects_request_without_method_or_url() {
        let harness = Harness::new(MockDispatcher::new());
        let queue = harness.queue("a");

        let err = queue
            .push_request(PushRequest::new(RequestSnapshot::new("", "")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InvalidRequest(_))
        ));

        // Queue state unaffected
        assert!(queue.get_all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_registers_sync_tag() {
        let harness = Harness::new(MockDispatcher::new());
        let queue = harness.queue("foo");

        queue
            .push_request(PushRequest::new(snapshot("https://example.com")))
            .await
            .unwrap();

        assert!(harness
            .hub
            .registered_tags()
            .contains(&"workbox-background-sync:foo".to_string()));
        // No immediate network attempt
        assert_eq!(harness.dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_push_succeeds_when_registration_is_denied() {
        let store = Arc::new(MemoryEntryStore::new());
        let queue = Queue::new(
            "a",
            QueueOptions::new(
                store.clone(),
                Arc::new(MockDispatcher::new()),
                Arc::new(DenyingSyncScheduler),
            )
            .registry(Arc::new(QueueRegistry::new())),
        )
        .unwrap();

        queue
            .push_request(PushRequest::new(snapshot("https://example.com")))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_drains_in_fifo_order() {
        let harness = Harness::new(MockDispatcher::new());
        let queue = harness.queue("a");

        for i in 1..=3 {
            queue
                .push_request(PushRequest::new(snapshot(&format!(
                    "https://example.com/{}",
                    i
                ))))
                .await
                .unwrap();
        }

        queue.replay_requests().await.unwrap();

        let urls: Vec<String> = harness
            .dispatcher
            .dispatched()
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/1",
                "https://example.com/2",
                "https://example.com/3"
            ]
        );
        assert!(queue.get_all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_2xx_response_still_dequeues() {
        let harness = Harness::new(MockDispatcher::with_script(vec![
            MockOutcome::Respond(500),
            MockOutcome::Respond(404),
        ]));
        let queue = harness.queue("a");

        for i in 1..=2 {
            queue
                .push_request(PushRequest::new(snapshot(&format!(
                    "https://example.com/{}",
                    i
                ))))
                .await
                .unwrap();
        }

        queue.replay_requests().await.unwrap();
        assert!(queue.get_all_entries().await.unwrap().is_empty());
        assert_eq!(harness.dispatcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_requeues_entry_and_stops_pass() {
        let harness = Harness::new(MockDispatcher::with_script(vec![
            MockOutcome::Respond(200),
            MockOutcome::NetworkFail,
        ]));
        let queue = harness.queue("a");

        queue
            .push_request(PushRequest::new(snapshot("https://example.com/1")))
            .await
            .unwrap();
        queue
            .push_request(
                PushRequest::new(snapshot("https://example.com/2"))
                    .timestamp(77)
                    .metadata(serde_json::json!({"meta": "data"})),
            )
            .await
            .unwrap();
        queue
            .push_request(PushRequest::new(snapshot("https://example.com/3")))
            .await
            .unwrap();

        queue.replay_requests().await.unwrap();

        // Entry 3 was never attempted
        assert_eq!(harness.dispatcher.call_count(), 2);

        let remaining = queue.get_all_entries().await.unwrap();
        assert_eq!(remaining.len(), 2);
        // Entry 3 kept its slot; the failed entry re-entered at the tail
        // of physical storage with a fresh id but its original timestamp
        // and metadata.
        assert_eq!(remaining[0].request_data.url, "https://example.com/3");
        assert_eq!(remaining[1].request_data.url, "https://example.com/2");
        assert_eq!(remaining[1].timestamp, 77);
        assert_eq!(
            remaining[1].metadata,
            Some(serde_json::json!({"meta": "data"}))
        );
        assert!(remaining[1].id > remaining[0].id);
    }

    #[tokio::test]
    async fn test_store_failure_during_requeue_propagates() {
        let harness = Harness::new(MockDispatcher::with_script(vec![MockOutcome::NetworkFail]));
        let queue = harness.queue("a");

        queue
            .push_request(PushRequest::new(snapshot("https://example.com")))
            .await
            .unwrap();

        harness.store.fail_next_push();
        let err = queue.replay_requests().await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_expired_entries_dropped_without_attempt() {
        let harness = Harness::new(MockDispatcher::new());
        let queue = Queue::new(
            "a",
            harness
                .options()
                .time_provider(Arc::new(FixedTimeProvider(10_000)))
                .max_retention_ms(1_000),
        )
        .unwrap();

        // Stale: enqueued 9s "ago" against a 1s window
        queue
            .push_request(PushRequest::new(snapshot("https://example.com/stale")).timestamp(1_000))
            .await
            .unwrap();
        // Fresh
        queue
            .push_request(PushRequest::new(snapshot("https://example.com/fresh")).timestamp(9_500))
            .await
            .unwrap();

        queue.replay_requests().await.unwrap();

        let urls: Vec<String> = harness
            .dispatcher
            .dispatched()
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(urls, vec!["https://example.com/fresh"]);
        assert!(queue.get_all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_is_non_destructive() {
        let harness = Harness::new(MockDispatcher::new());
        let queue = harness.queue("a");

        queue
            .push_request(PushRequest::new(snapshot("https://example.com")))
            .await
            .unwrap();

        let first = queue.get_all_entries().await.unwrap();
        let second = queue.get_all_entries().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_event_triggers_replay_for_matching_tag_only() {
        let harness = Harness::new(MockDispatcher::new());
        let queue = harness.queue("a");

        queue
            .push_request(PushRequest::new(snapshot("https://example.com")))
            .await
            .unwrap();

        harness
            .hub
            .dispatch_sync("workbox-background-sync:other")
            .await
            .unwrap();
        assert_eq!(queue.get_all_entries().await.unwrap().len(), 1);

        harness
            .hub
            .dispatch_sync("workbox-background-sync:a")
            .await
            .unwrap();
        assert!(queue.get_all_entries().await.unwrap().is_empty());
        assert_eq!(harness.dispatcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_custom_on_sync_replaces_default_replay() {
        let harness = Harness::new(MockDispatcher::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let queue = Queue::new(
            "a",
            harness.options().on_sync(Box::new(move |ctx: SyncContext| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    assert_eq!(ctx.queue.name(), "a");
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })),
        )
        .unwrap();

        queue
            .push_request(PushRequest::new(snapshot("https://example.com")))
            .await
            .unwrap();

        harness
            .hub
            .dispatch_sync("workbox-background-sync:a")
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Default replay did not also run: entry is still pending
        assert_eq!(queue.get_all_entries().await.unwrap().len(), 1);
        assert_eq!(harness.dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_platform_replays_once_at_construction() {
        let store = Arc::new(MemoryEntryStore::new());
        let dispatcher = Arc::new(MockDispatcher::new());

        store
            .push_entry(NewEntry {
                queue_name: "a".to_string(),
                request_data: snapshot("https://example.com"),
                timestamp: 0,
                metadata: None,
            })
            .await
            .unwrap();

        let _queue = Queue::new(
            "a",
            QueueOptions::new(
                store.clone(),
                dispatcher.clone(),
                Arc::new(UnsupportedSyncScheduler),
            )
            .registry(Arc::new(QueueRegistry::new())),
        )
        .unwrap();

        // The fallback replay is spawned; give it a moment to run.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(dispatcher.call_count(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_replays_never_double_dispatch() {
        let harness =
            Harness::new(MockDispatcher::new().with_delay(Duration::from_millis(10)));
        let queue = harness.queue("a");

        for i in 1..=3 {
            queue
                .push_request(PushRequest::new(snapshot(&format!(
                    "https://example.com/{}",
                    i
                ))))
                .await
                .unwrap();
        }

        let q1 = Arc::clone(&queue);
        let q2 = Arc::clone(&queue);
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { q1.replay_requests().await }),
            tokio::spawn(async move { q2.replay_requests().await }),
        );
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        // Total attempts equals total pushed entries, never double-counted
        assert_eq!(harness.dispatcher.call_count(), 3);
        assert!(queue.get_all_entries().await.unwrap().is_empty());
    }
}
