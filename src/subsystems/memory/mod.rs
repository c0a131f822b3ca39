//! Per-user conversational memory in capped JSON history files.
//!
//! Layout under the work directory:
//!
//! ```text
//! memory/
//!   users/
//!     {user_id}/history.json    { "cap": N, "entries": [...] }
//! ```
//!
//! Entries are capped by count (FIFO, oldest dropped first). All writes go
//! through one async mutex so concurrent answers for the same user cannot
//! interleave their read-modify-write cycles. Each write lands in
//! `history.json.tmp` first and is renamed over `history.json`, so a failed
//! write leaves the previous history intact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::is_valid_user_id;

const HISTORY_FILENAME: &str = "history.json";
const HISTORY_TMP_FILENAME: &str = "history.json.tmp";
const PROBE_FILENAME: &str = ".health-probe";

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("invalid user id: {0:?}")]
    InvalidUser(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub commits_analyzed: usize,
    pub timestamp: DateTime<Utc>,
}

/// On-disk shape of `history.json`.
#[derive(Serialize, Deserialize)]
struct HistoryFile {
    cap: usize,
    entries: Vec<Exchange>,
}

pub struct MemoryStore {
    root: PathBuf,
    cap: usize,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    /// Create the store rooted at `{work_dir}/memory`.
    pub fn new(work_dir: &Path, cap: usize) -> Result<Self, MemoryError> {
        let root = work_dir.join("memory");
        let users = root.join("users");
        std::fs::create_dir_all(&users).map_err(|source| MemoryError::Io { path: users, source })?;
        info!(root = %root.display(), cap, "memory store initialised");
        Ok(Self { root, cap: cap.max(1), write_lock: Mutex::new(()) })
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf, MemoryError> {
        if !is_valid_user_id(user_id) {
            return Err(MemoryError::InvalidUser(user_id.to_string()));
        }
        Ok(self.root.join("users").join(user_id))
    }

    async fn read_history(path: &Path) -> Result<Option<HistoryFile>, MemoryError> {
        let data = match fs::read_to_string(path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MemoryError::Io { path: path.to_path_buf(), source }),
        };
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| MemoryError::Malformed { path: path.to_path_buf(), message: e.to_string() })
    }

    /// Append an exchange to the user's history, evicting the oldest past the cap.
    pub async fn add_exchange(
        &self,
        user_id: &str,
        question: &str,
        answer: &str,
        commits_analyzed: usize,
    ) -> Result<(), MemoryError> {
        let dir = self.user_dir(user_id)?;
        let path = dir.join(HISTORY_FILENAME);
        let tmp = dir.join(HISTORY_TMP_FILENAME);

        let _guard = self.write_lock.lock().await;

        fs::create_dir_all(&dir)
            .await
            .map_err(|source| MemoryError::Io { path: dir.clone(), source })?;

        let mut file = Self::read_history(&path)
            .await?
            .unwrap_or(HistoryFile { cap: self.cap, entries: Vec::new() });
        file.cap = self.cap;
        file.entries.push(Exchange {
            question: question.to_string(),
            answer: answer.to_string(),
            commits_analyzed,
            timestamp: Utc::now(),
        });
        if file.entries.len() > file.cap {
            let excess = file.entries.len() - file.cap;
            file.entries.drain(..excess);
        }

        let data = serde_json::to_string_pretty(&file)
            .map_err(|e| MemoryError::Malformed { path: path.clone(), message: e.to_string() })?;
        fs::write(&tmp, data)
            .await
            .map_err(|source| MemoryError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| MemoryError::Io { path: path.clone(), source })?;

        debug!(%user_id, commits_analyzed, stored = file.entries.len(), "exchange saved");
        Ok(())
    }

    /// The user's last `limit` exchanges, oldest first. Unknown users have none.
    pub async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<Exchange>, MemoryError> {
        let path = self.user_dir(user_id)?.join(HISTORY_FILENAME);
        let entries = Self::read_history(&path).await?.map(|f| f.entries).unwrap_or_default();
        let skip = entries.len().saturating_sub(limit);
        let out: Vec<Exchange> = entries.into_iter().skip(skip).collect();
        debug!(%user_id, limit, returned = out.len(), "history retrieved");
        Ok(out)
    }

    /// `true` when the store directory accepts a write.
    pub async fn health_check(&self) -> bool {
        let probe = self.root.join(PROBE_FILENAME);
        let result = async {
            fs::write(&probe, b"ok").await?;
            fs::remove_file(&probe).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("memory health check failed: {e}");
                false
            }
        }
    }
}
