//! In-memory checkpointer: the state after each node, keyed by thread id.
//!
//! Same shape as a health registry: an `Arc<RwLock<HashMap>>` that is cheap
//! to clone and safe to share between concurrent runs. Each thread keeps only
//! its most recent checkpoints, and only the most recently saved threads are
//! kept at all.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::state::{Node, PipelineState};

const PER_THREAD_CAP: usize = 16;
const DEFAULT_MAX_THREADS: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub node: Node,
    pub state: PipelineState,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Thread {
    /// Save sequence number of the latest checkpoint.
    touched: u64,
    entries: VecDeque<Checkpoint>,
}

#[derive(Default)]
struct Registry {
    next_seq: u64,
    threads: HashMap<String, Thread>,
}

#[derive(Clone)]
pub struct Checkpoints {
    inner: Arc<RwLock<Registry>>,
    max_threads: usize,
}

impl Default for Checkpoints {
    fn default() -> Self {
        Self::with_max_threads(DEFAULT_MAX_THREADS)
    }
}

impl Checkpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_threads` threads; saving past that evicts the thread
    /// saved least recently.
    pub fn with_max_threads(max_threads: usize) -> Self {
        Self { inner: Arc::default(), max_threads: max_threads.max(1) }
    }

    pub async fn save(&self, thread_id: &str, node: Node, state: &PipelineState) {
        let mut reg = self.inner.write().await;
        let seq = reg.next_seq;
        reg.next_seq += 1;

        let thread = reg.threads.entry(thread_id.to_string()).or_default();
        thread.touched = seq;
        thread.entries.push_back(Checkpoint { node, state: state.clone(), at: Utc::now() });
        while thread.entries.len() > PER_THREAD_CAP {
            thread.entries.pop_front();
        }

        if reg.threads.len() > self.max_threads {
            let oldest = reg
                .threads
                .iter()
                .min_by_key(|(_, t)| t.touched)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                reg.threads.remove(&id);
                debug!(thread_id = %id, "checkpoint thread evicted");
            }
        }
    }

    /// Most recent checkpoint for `thread_id`, if any run has happened.
    pub async fn latest(&self, thread_id: &str) -> Option<Checkpoint> {
        self.inner.read().await.threads.get(thread_id).and_then(|t| t.entries.back().cloned())
    }

    /// Node sequence recorded for `thread_id`, oldest first.
    pub async fn trail(&self, thread_id: &str) -> Vec<Node> {
        self.inner
            .read()
            .await
            .threads
            .get(thread_id)
            .map(|t| t.entries.iter().map(|c| c.node).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_tracks_last_saved_node() {
        let cp = Checkpoints::new();
        assert!(cp.latest("t").await.is_none());

        let state = PipelineState::new("q", "t", Vec::new());
        cp.save("t", Node::Fetch, &state).await;
        cp.save("t", Node::Error, &state).await;

        assert_eq!(cp.latest("t").await.unwrap().node, Node::Error);
        assert_eq!(cp.trail("t").await, vec![Node::Fetch, Node::Error]);
        assert!(cp.trail("other").await.is_empty());
    }

    #[tokio::test]
    async fn threads_are_capped() {
        let cp = Checkpoints::new();
        let state = PipelineState::new("q", "t", Vec::new());
        for _ in 0..(PER_THREAD_CAP + 5) {
            cp.save("t", Node::Fetch, &state).await;
        }
        assert_eq!(cp.trail("t").await.len(), PER_THREAD_CAP);
    }

    #[tokio::test]
    async fn least_recently_saved_thread_is_evicted() {
        let cp = Checkpoints::with_max_threads(2);
        let state = PipelineState::new("q", "t", Vec::new());
        cp.save("a", Node::Fetch, &state).await;
        cp.save("b", Node::Fetch, &state).await;
        cp.save("a", Node::Analyze, &state).await;
        cp.save("c", Node::Fetch, &state).await;

        assert!(cp.latest("b").await.is_none());
        assert_eq!(cp.latest("a").await.unwrap().node, Node::Analyze);
        assert_eq!(cp.latest("c").await.unwrap().node, Node::Fetch);
    }

    #[tokio::test]
    async fn thread_count_stays_bounded() {
        let cp = Checkpoints::with_max_threads(8);
        let state = PipelineState::new("q", "t", Vec::new());
        for i in 0..100 {
            cp.save(&i.to_string(), Node::Fetch, &state).await;
        }
        assert_eq!(cp.inner.read().await.threads.len(), 8);
        assert!(cp.latest("99").await.is_some());
        assert!(cp.latest("91").await.is_none());
    }
}
