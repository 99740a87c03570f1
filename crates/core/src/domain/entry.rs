// Queue Entry Domain Model

use serde::{Deserialize, Serialize};

/// Queue identifier
pub type QueueName = String;

/// Tag prefix used for sync registrations; a queue listens on
/// `TAG_PREFIX + name` and ignores every other tag.
pub const TAG_PREFIX: &str = "workbox-background-sync:";

/// Sync tag for a queue name
pub fn sync_tag(name: &str) -> String {
    format!("{}{}", TAG_PREFIX, name)
}

/// Serializable snapshot of an HTTP request.
///
/// Headers are kept as an ordered list of pairs so the replayed request
/// carries them in their original order. `mode` and `credentials` are
/// opaque string enums round-tripped through storage; the body, when
/// present, is retained as raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub url: String,
    pub method: String,

    #[serde(default)]
    pub headers: Vec<(String, String)>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

impl RequestSnapshot {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: Vec::new(),
            mode: None,
            credentials: None,
            body: None,
        }
    }

    /// Convenience constructor for the common GET case
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// A request must carry at least a method and a url to be replayable.
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty() && !self.method.is_empty()
    }

    /// First header value for `name`, comparing case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One durable record: a request snapshot plus queue ownership and
/// enqueue metadata. `id` is assigned by the store on insert and is
/// strictly increasing within a queue partition, never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: QueueName,
    pub request_data: RequestSnapshot,
    pub timestamp: i64, // epoch ms at enqueue
    pub metadata: Option<serde_json::Value>,
}

/// Entry as handed to the store, before an id exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub queue_name: QueueName,
    pub request_data: RequestSnapshot,
    pub timestamp: i64,
    pub metadata: Option<serde_json::Value>,
}

impl NewEntry {
    /// Rebuild a pending entry from one that was shifted out but could
    /// not be replayed. The original timestamp and metadata are kept;
    /// the store assigns a fresh id on insert.
    pub fn from_entry(entry: QueueEntry) -> Self {
        Self {
            queue_name: entry.queue_name,
            request_data: entry.request_data,
            timestamp: entry.timestamp,
            metadata: entry.metadata,
        }
    }
}
