// Queue Registry - process-wide uniqueness of live queue names

use crate::domain::error::Result;
use crate::domain::DomainError;
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

/// Process-wide set of currently-live queue names.
///
/// A name enters the set when its queue is constructed and is never
/// removed for the life of the process, even if the queue object itself
/// is dropped: its sync tag must stay addressable until the process
/// restarts. This is deliberate, explicit process-wide state, not an
/// incidental singleton; tests may construct private registries.
pub struct QueueRegistry {
    names: Mutex<HashSet<String>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            names: Mutex::new(HashSet::new()),
        }
    }

    /// The process-wide registry used when none is injected
    pub fn global() -> &'static QueueRegistry {
        static GLOBAL: OnceLock<QueueRegistry> = OnceLock::new();
        GLOBAL.get_or_init(QueueRegistry::new)
    }

    /// Claim a name. Fails if a live queue already holds it.
    pub fn register(&self, name: &str) -> Result<()> {
        let mut names = self.names.lock().unwrap_or_else(|p| p.into_inner());
        if !names.insert(name.to_string()) {
            return Err(DomainError::DuplicateQueueName(name.to_string()));
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        let names = self.names.lock().unwrap_or_else(|p| p.into_inner());
        names.contains(name)
    }

    pub fn len(&self) -> usize {
        let names = self.names.lock().unwrap_or_else(|p| p.into_inner());
        names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
