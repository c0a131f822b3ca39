//! Service assembly: turns a loaded [`Config`] into the shared comms state.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::llm::providers;
use crate::prompt::Prompts;
use crate::subsystems::assistant::Assistant;
use crate::subsystems::comms::CommsState;
use crate::subsystems::github::GitHubClient;
use crate::subsystems::memory::MemoryStore;
use crate::subsystems::pipeline::Pipeline;
use crate::subsystems::spec_kit::SpecKit;

/// Build every service the channels share. Fails on missing GitHub or LLM
/// credentials and on an unwritable work directory.
pub fn build_services(config: &Config, prompts: Prompts) -> Result<Arc<CommsState>, AppError> {
    let github = GitHubClient::new(&config.github, config.secrets.github_token.clone())
        .map_err(|e| AppError::GitHub(e.to_string()))?;

    let llm = providers::build(&config.llm, config.secrets.llm_api_key.clone())
        .map_err(|e| AppError::Llm(e.to_string()))?;
    info!(provider = llm.name(), "llm provider ready");

    let memory = MemoryStore::new(&config.work_dir, config.memory.history_cap)
        .map_err(|e| AppError::Memory(e.to_string()))?;

    let pipeline = Pipeline::new(github.clone(), llm.clone(), prompts.clone(), config.github.lookback_hours);

    let assistant = Assistant::new(
        Arc::new(pipeline),
        Arc::new(memory),
        config.memory.history_limit,
        Duration::from_secs(config.pipeline.timeout_seconds),
    );

    let spec_kit = SpecKit::new(llm.clone(), prompts, config.spec_kit.specs_dir.clone())
        .map_err(|e| AppError::SpecKit(e.to_string()))?;

    Ok(Arc::new(CommsState::new(
        config.bot_name.clone(),
        Arc::new(assistant),
        Arc::new(spec_kit),
        github,
        llm,
        config.memory.history_limit,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_token_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::test_default(dir.path());
        let err = build_services(&config, Prompts::default()).err().unwrap();
        assert!(matches!(err, AppError::GitHub(_)));
    }

    #[test]
    fn gemini_needs_an_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::test_default(dir.path());
        config.secrets.github_token = Some("ghp_test".into());
        config.llm.provider = "gemini".into();
        let err = build_services(&config, Prompts::default()).err().unwrap();
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[test]
    fn builds_with_dummy_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::test_default(dir.path());
        config.secrets.github_token = Some("ghp_test".into());
        let state = build_services(&config, Prompts::default()).unwrap();
        assert_eq!(state.bot_name(), "test");
        assert!(dir.path().join("memory/users").is_dir());
        assert!(dir.path().join("specs").is_dir());
    }
}
