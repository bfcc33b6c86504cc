//! # In-Memory Session Store
//!
//! Keeps every session's transcripts in a shared map for the life of the
//! process. Selected with `storage.backend = "memory"` and used by the tests.

use crate::store::{SessionStore, StoreError, TranscriptRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-process transcript log. Contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Vec<TranscriptRecord>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended for `session_id`, oldest first.
    #[cfg(test)]
    pub fn records(&self, session_id: &str) -> Vec<TranscriptRecord> {
        self.sessions
            .read()
            .map(|sessions| sessions.get(session_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of records across all sessions.
    #[cfg(test)]
    pub fn total_records(&self) -> usize {
        self.sessions
            .read()
            .map(|sessions| sessions.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, session_id: &str, record: TranscriptRecord) -> Result<(), StoreError> {
        if session_id.is_empty() {
            return Err(StoreError::InvalidKey(session_id.to_string()));
        }

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StoreError::Io(std::io::Error::other("memory store lock poisoned")))?;
        sessions.entry(session_id.to_string()).or_default().push(record);
        Ok(())
    }
}
