// Port Layer - Interfaces for external dependencies

pub mod entry_store;
pub mod request_dispatcher;
pub mod sync_scheduler;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use entry_store::EntryStore;
pub use request_dispatcher::{DispatchError, DispatchReceipt, RequestDispatcher};
pub use sync_scheduler::{
    LocalSyncHub, SyncError, SyncHandler, SyncScheduler, UnsupportedSyncScheduler,
};
pub use time_provider::TimeProvider;
