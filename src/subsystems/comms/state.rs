//! Shared state for the comms subsystem: the capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and only reach the bot's services
//! through the typed methods below.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::llm::LlmProvider;
use crate::models::HealthCheck;
use crate::subsystems::assistant::{AskOutcome, Assistant};
use crate::subsystems::github::GitHubClient;
use crate::subsystems::memory::{Exchange, MemoryError};
use crate::subsystems::pipeline::Checkpoint;
use crate::subsystems::spec_kit::SpecKit;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CommsState {
    bot_name: String,
    assistant: Arc<Assistant>,
    spec_kit: Arc<SpecKit>,
    github: GitHubClient,
    llm: LlmProvider,
    history_limit: usize,
    /// Set once Discord slash commands are registered.
    discord_ready: Arc<AtomicBool>,
}

impl CommsState {
    pub fn new(
        bot_name: impl Into<String>,
        assistant: Arc<Assistant>,
        spec_kit: Arc<SpecKit>,
        github: GitHubClient,
        llm: LlmProvider,
        history_limit: usize,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            assistant,
            spec_kit,
            github,
            llm,
            history_limit,
            discord_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn spec_kit(&self) -> &SpecKit {
        &self.spec_kit
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub async fn ask(&self, user_id: &str, question: &str) -> AskOutcome {
        self.assistant.ask(user_id, question).await
    }

    pub async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<Exchange>, MemoryError> {
        self.assistant.memory().history(user_id, limit).await
    }

    /// State recorded after the last pipeline node for this user, if any.
    pub async fn last_run(&self, user_id: &str) -> Option<Checkpoint> {
        self.assistant.pipeline().checkpoints().latest(user_id).await
    }

    pub fn discord_ready_flag(&self) -> Arc<AtomicBool> {
        self.discord_ready.clone()
    }

    pub fn discord_ready(&self) -> bool {
        self.discord_ready.load(Ordering::Relaxed)
    }

    /// Probe GitHub, the LLM and the memory store concurrently.
    pub async fn health(&self) -> HealthCheck {
        let github = async {
            tokio::time::timeout(HEALTH_PROBE_TIMEOUT, self.github.health_check())
                .await
                .unwrap_or_else(|_| {
                    warn!("github health check timed out");
                    false
                })
        };
        let ai = async {
            match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, self.llm.ping()).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!(provider = self.llm.name(), "llm health check failed: {e}");
                    false
                }
                Err(_) => {
                    warn!(provider = self.llm.name(), "llm health check timed out");
                    false
                }
            }
        };
        let memory = async {
            tokio::time::timeout(HEALTH_PROBE_TIMEOUT, self.assistant.memory().health_check())
                .await
                .unwrap_or(false)
        };

        let (github, ai, memory) = tokio::join!(github, ai, memory);
        let health = HealthCheck::from_checks(self.discord_ready(), github, ai, memory);
        debug!(?health, "health status");
        health
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use httpmock::MockServer;

    use super::*;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::prompt::Prompts;
    use crate::subsystems::github::testing::client;
    use crate::subsystems::memory::MemoryStore;
    use crate::subsystems::pipeline::Pipeline;

    /// Comms state wired to a mock GitHub server, the dummy LLM and a temp work dir.
    pub(crate) fn comms_state(server: &MockServer, dir: &Path) -> Arc<CommsState> {
        let github = client(server);
        let llm = LlmProvider::Dummy(DummyProvider);
        let prompts = Prompts::new(dir.join("prompts"));
        let pipeline = Pipeline::new(github.clone(), llm.clone(), prompts.clone(), 24);
        let memory = MemoryStore::new(dir, 10).unwrap();
        let assistant =
            Assistant::new(Arc::new(pipeline), Arc::new(memory), 5, Duration::from_secs(5));
        let spec_kit = SpecKit::new(llm.clone(), prompts, dir.join("specs")).unwrap();
        Arc::new(CommsState::new("test-bot", Arc::new(assistant), Arc::new(spec_kit), github, llm, 5))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::comms_state;
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn health_reports_each_probe() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/user");
                then.status(200).json_body(serde_json::json!({ "login": "octo" }));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let state = comms_state(&server, dir.path());

        let h = state.health().await;
        assert_eq!(h.status, "healthy");
        assert!(h.github_connected && h.ai_connected && h.memory_connected);
        assert!(!h.discord_bot);

        state.discord_ready_flag().store(true, Ordering::Relaxed);
        assert!(state.health().await.discord_bot);
    }

    #[tokio::test]
    async fn bad_github_token_degrades_health() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/user");
                then.status(401).json_body(serde_json::json!({ "message": "Bad credentials" }));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let h = comms_state(&server, dir.path()).health().await;
        assert_eq!(h.status, "degraded");
        assert!(!h.github_connected);
    }
}
