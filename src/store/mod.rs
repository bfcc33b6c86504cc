//! # Session Store
//!
//! Append-only persistence for transcripts, keyed by session (meeting) id.
//! The trait has no read path; the relay only writes.
//!
//! ## Backends:
//! - **jsonl**: One JSON-lines file per session on local disk
//! - **memory**: In-process map, for development and tests

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlSessionStore;
pub use memory::MemorySessionStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One transcribed window, attributed to a session and speaker.
///
/// Created once per successful transcription and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRecord {
    pub session_id: String,
    pub speaker_id: String,
    pub text: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl TranscriptRecord {
    /// Build a record stamped with the current time.
    pub fn new(session_id: impl Into<String>, speaker_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            speaker_id: speaker_id.into(),
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    /// The session id can't be used as a collection key
    InvalidKey(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidKey(key) => write!(f, "invalid session key '{}'", key),
            StoreError::Io(err) => write!(f, "store I/O failed: {}", err),
            StoreError::Serialization(err) => write!(f, "record serialization failed: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

/// Keyed, append-only transcript log.
///
/// ## Thread Safety:
/// Constructed once at startup and shared by every connection as
/// `Arc<dyn SessionStore>`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name for logs and metrics.
    fn name(&self) -> &str;

    /// Append `record` to the collection for `session_id`.
    async fn append(&self, session_id: &str, record: TranscriptRecord) -> Result<(), StoreError>;
}
