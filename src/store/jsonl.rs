//! # JSON-Lines Session Store
//!
//! Persists transcripts under `{root}/meetings/{session_id}/transcripts.jsonl`,
//! one JSON object per line. Each append opens the file in append mode and
//! writes a single complete line, so concurrent connections writing to the
//! same session interleave whole records.

use crate::store::{SessionStore, StoreError, TranscriptRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const COLLECTION_DIR: &str = "meetings";
const TRANSCRIPTS_FILE: &str = "transcripts.jsonl";

#[derive(Debug, Clone)]
pub struct JsonlSessionStore {
    root: PathBuf,
}

impl JsonlSessionStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(COLLECTION_DIR)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the transcript log for `session_id`.
    pub fn session_path(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_key(session_id) {
            return Err(StoreError::InvalidKey(session_id.to_string()));
        }
        Ok(self
            .root
            .join(COLLECTION_DIR)
            .join(session_id)
            .join(TRANSCRIPTS_FILE))
    }
}

/// Session ids become directory names, so only allow a conservative charset.
fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn append(&self, session_id: &str, record: TranscriptRecord) -> Result<(), StoreError> {
        let path = self.session_path(session_id)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
