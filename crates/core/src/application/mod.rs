// Application Layer - Queue, registry and replay logic

pub mod queue;
pub mod registry;

// Re-exports
pub use queue::{OnSync, PushRequest, Queue, QueueOptions, SyncContext};
pub use registry::QueueRegistry;
