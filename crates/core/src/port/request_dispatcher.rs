// Request Dispatcher Port
// Abstraction over the network layer used to re-issue stored requests

use crate::domain::RequestSnapshot;
use async_trait::async_trait;
use thiserror::Error;

/// Outcome of a successfully dispatched request. Any settled response
/// counts, whatever its status code; only transport-level failure is an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub status: u16,
}

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The request could not be completed at the transport level
    /// (offline, connection refused, DNS failure, ...)
    #[error("Network failure: {0}")]
    Network(String),

    /// The stored snapshot cannot be turned into a request at all
    /// (bad method or header). Not retryable.
    #[error("Malformed request: {0}")]
    Malformed(String),
}

/// Network seam for replay.
///
/// Implementations:
/// - HttpDispatcher (infra-http): reqwest-backed production client
/// - mocks::MockDispatcher: scripted outcomes for tests
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    /// Re-issue a stored request.
    ///
    /// # Errors
    /// - DispatchError::Network if the request never settled
    /// - DispatchError::Malformed if the snapshot cannot be rebuilt
    async fn dispatch(&self, request: &RequestSnapshot)
        -> Result<DispatchReceipt, DispatchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted outcome for one dispatch call
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        /// Respond with the given status code
        Respond(u16),
        /// Fail at the transport level
        NetworkFail,
    }

    /// Mock dispatcher for testing. Pops outcomes from a script, falling
    /// back to a 200 response once the script is exhausted, and records
    /// every dispatched snapshot in order.
    pub struct MockDispatcher {
        script: Mutex<VecDeque<MockOutcome>>,
        log: Mutex<Vec<RequestSnapshot>>,
        delay: Option<Duration>,
    }

    impl MockDispatcher {
        /// Always respond 200
        pub fn new() -> Self {
            Self::with_script(Vec::new())
        }

        pub fn with_script(outcomes: Vec<MockOutcome>) -> Self {
            Self {
                script: Mutex::new(outcomes.into()),
                log: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        /// Hold each dispatch open for `delay` (for overlap tests)
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn push_outcome(&self, outcome: MockOutcome) {
            self.script
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push_back(outcome);
        }

        /// Snapshots dispatched so far, in call order
        pub fn dispatched(&self) -> Vec<RequestSnapshot> {
            self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }

        pub fn call_count(&self) -> usize {
            self.log.lock().unwrap_or_else(|p| p.into_inner()).len()
        }
    }

    impl Default for MockDispatcher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RequestDispatcher for MockDispatcher {
        async fn dispatch(
            &self,
            request: &RequestSnapshot,
        ) -> Result<DispatchReceipt, DispatchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.log
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(request.clone());

            let outcome = self
                .script
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .pop_front()
                .unwrap_or(MockOutcome::Respond(200));

            match outcome {
                MockOutcome::Respond(status) => Ok(DispatchReceipt { status }),
                MockOutcome::NetworkFail => {
                    Err(DispatchError::Network("simulated offline".to_string()))
                }
            }
        }
    }
}
