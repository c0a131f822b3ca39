//! Question answering shared by every channel.
//!
//! Wraps one pipeline run with the caller's history, a timeout, and a memory
//! write for answered questions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::models::Answer;
use crate::subsystems::memory::MemoryStore;
use crate::subsystems::pipeline::{Pipeline, PipelineState, preview};

/// How a question ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    Answered(Answer),
    /// The lookback window held no commits.
    NoCommits { hours: u32 },
    Failed(String),
    TimedOut,
}

pub struct Assistant {
    pipeline: Arc<Pipeline>,
    memory: Arc<MemoryStore>,
    history_limit: usize,
    timeout: Duration,
}

impl Assistant {
    pub fn new(
        pipeline: Arc<Pipeline>,
        memory: Arc<MemoryStore>,
        history_limit: usize,
        timeout: Duration,
    ) -> Self {
        Self { pipeline, memory, history_limit, timeout }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub async fn ask(&self, user_id: &str, question: &str) -> AskOutcome {
        info!(%user_id, question = %preview(question), "question received");

        let history = match self.memory.history(user_id, self.history_limit).await {
            Ok(h) => h,
            Err(e) => {
                warn!(%user_id, "could not load history: {e}");
                Vec::new()
            }
        };

        let state = PipelineState::new(question, user_id, history);
        let Ok(state) = tokio::time::timeout(self.timeout, self.pipeline.invoke(state, user_id)).await
        else {
            warn!(%user_id, timeout_secs = self.timeout.as_secs(), "pipeline timed out");
            return AskOutcome::TimedOut;
        };

        if let Some(err) = state.error {
            return AskOutcome::Failed(err);
        }
        if state.commits_analyzed == 0 {
            return AskOutcome::NoCommits { hours: self.pipeline.lookback_hours() };
        }
        let Some(answer) = state.answer else {
            return AskOutcome::Failed("pipeline finished without an answer".to_string());
        };

        if let Err(e) = self
            .memory
            .add_exchange(user_id, question, &answer, state.commits_analyzed)
            .await
        {
            warn!(%user_id, "failed to save exchange: {e}");
        }

        AskOutcome::Answered(Answer {
            question: question.to_string(),
            answer,
            commits_analyzed: state.commits_analyzed,
            timestamp: Utc::now(),
        })
    }
}
