// Domain Layer - Pure entities, no I/O

pub mod entry;
pub mod error;

// Re-exports
pub use entry::{sync_tag, NewEntry, QueueEntry, QueueName, RequestSnapshot, TAG_PREFIX};
pub use error::DomainError;
