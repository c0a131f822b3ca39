//! Spec-driven development helpers: specify → plan → task.
//!
//! Each feature lives in its own directory under the specs root:
//!
//! ```text
//! specs/
//!   {feature}/
//!     spec.md
//!     plan.md
//!     tasks.md
//!     contracts/models.rs
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info};

use crate::llm::{ChatMessage, LlmProvider};
use crate::prompt::{self, Prompts};

const MAX_NAME_SOURCE_CHARS: usize = 50;

const SPEC_FILE: &str = "spec.md";
const PLAN_FILE: &str = "plan.md";
const TASKS_FILE: &str = "tasks.md";
const CONTRACTS_DIR: &str = "contracts";
const CONTRACTS_FILE: &str = "models.rs";

const ARCHITECT: &str = "You are a software architect.";
const CONTRACTS_EXPERT: &str = "You are a Rust expert who writes precise serde data contracts.";
const PROJECT_MANAGER: &str = "You are a project manager.";

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("static regex"));
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("static regex"));
static RUST_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```rust\s*\n?(.*?)```").expect("static regex"));

#[derive(Debug, Error)]
pub enum SpecKitError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("LLM call failed: {0}")]
    Llm(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecifyResult {
    pub feature_name: String,
    pub spec_file: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanResult {
    pub feature_name: String,
    pub contracts_file: PathBuf,
    pub plan_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TasksResult {
    pub feature_name: String,
    pub tasks_file: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub name: String,
    pub has_spec: bool,
    pub has_plan: bool,
    pub has_tasks: bool,
}

/// Lowercase, drop punctuation, join words with `-`.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let cleaned = NON_SLUG_CHARS.replace_all(&lower, "");
    let joined = SEPARATOR_RUNS.replace_all(&cleaned, "-");
    joined.trim_matches('-').to_string()
}

/// A feature name is a non-empty string that slugifies to itself.
pub fn is_valid_feature_name(name: &str) -> bool {
    !name.is_empty() && slugify(name) == name
}

/// Body of the first fenced rust block, or the whole text when there is none.
fn extract_rust_block(text: &str) -> String {
    RUST_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.to_string())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SpecKitError + '_ {
    move |source| SpecKitError::Io { path: path.to_path_buf(), source }
}

pub struct SpecKit {
    llm: LlmProvider,
    prompts: Prompts,
    specs_dir: PathBuf,
}

impl SpecKit {
    pub fn new(llm: LlmProvider, prompts: Prompts, specs_dir: PathBuf) -> Result<Self, SpecKitError> {
        std::fs::create_dir_all(&specs_dir).map_err(io_err(&specs_dir))?;
        info!(specs_dir = %specs_dir.display(), "spec kit initialised");
        Ok(Self { llm, prompts, specs_dir })
    }

    pub fn specs_dir(&self) -> &Path {
        &self.specs_dir
    }

    fn feature_dir(&self, name: &str) -> Result<PathBuf, SpecKitError> {
        if !is_valid_feature_name(name) {
            return Err(SpecKitError::InvalidInput(format!("invalid feature name: {name:?}")));
        }
        Ok(self.specs_dir.join(name))
    }

    async fn generate(&self, system: &str, user: String) -> Result<String, SpecKitError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        self.llm
            .complete(&messages)
            .await
            .map(|r| r.text)
            .map_err(|e| {
                error!("spec kit generation failed: {e}");
                SpecKitError::Llm(e.to_string())
            })
    }

    async fn read_spec(&self, dir: &Path) -> Result<String, SpecKitError> {
        let path = dir.join(SPEC_FILE);
        match fs::read_to_string(&path).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %path.display(), "spec file not found");
                Err(SpecKitError::NotFound("Run /specify first".to_string()))
            }
            Err(source) => Err(SpecKitError::Io { path, source }),
        }
    }

    /// `/specify`: derive a feature name from `description` and write `spec.md`.
    pub async fn specify(&self, description: &str) -> Result<SpecifyResult, SpecKitError> {
        let head: String = description
            .split('.')
            .next()
            .unwrap_or_default()
            .chars()
            .take(MAX_NAME_SOURCE_CHARS)
            .collect();
        let feature_name = slugify(&head);
        if feature_name.is_empty() {
            return Err(SpecKitError::InvalidInput(
                "description must start with at least one word".to_string(),
            ));
        }
        info!(%feature_name, "creating specification");

        let dir = self.specs_dir.join(&feature_name);
        fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;

        let prompt = self.prompts.render(prompt::SPEC_SPECIFY).var("description", description).build();
        let content = self.generate(ARCHITECT, prompt).await?;

        let spec_file = dir.join(SPEC_FILE);
        fs::write(&spec_file, &content).await.map_err(io_err(&spec_file))?;
        info!(path = %spec_file.display(), "specification created");

        Ok(SpecifyResult { feature_name, spec_file, content })
    }

    /// `/plan`: write `contracts/models.rs` and `plan.md` from an existing spec.
    pub async fn plan(&self, feature_name: &str) -> Result<PlanResult, SpecKitError> {
        let dir = self.feature_dir(feature_name)?;
        info!(%feature_name, "creating implementation plan");
        let spec = self.read_spec(&dir).await?;
        debug!(chars = spec.len(), "read spec");

        let contracts_dir = dir.join(CONTRACTS_DIR);
        fs::create_dir_all(&contracts_dir).await.map_err(io_err(&contracts_dir))?;

        let prompt = self.prompts.render(prompt::SPEC_CONTRACTS).var("spec", spec.as_str()).build();
        let contracts = extract_rust_block(&self.generate(CONTRACTS_EXPERT, prompt).await?);
        let contracts_file = contracts_dir.join(CONTRACTS_FILE);
        fs::write(&contracts_file, contracts).await.map_err(io_err(&contracts_file))?;
        info!(path = %contracts_file.display(), "contracts created");

        let prompt = self.prompts.render(prompt::SPEC_PLAN).var("spec", spec).build();
        let plan = self.generate(ARCHITECT, prompt).await?;
        let plan_file = dir.join(PLAN_FILE);
        fs::write(&plan_file, plan).await.map_err(io_err(&plan_file))?;
        info!(path = %plan_file.display(), "plan created");

        Ok(PlanResult { feature_name: feature_name.to_string(), contracts_file, plan_file })
    }

    /// `/tasks`: break the spec (and plan, when present) into `tasks.md`.
    pub async fn task(&self, feature_name: &str) -> Result<TasksResult, SpecKitError> {
        let dir = self.feature_dir(feature_name)?;
        info!(%feature_name, "creating task breakdown");
        let spec = self.read_spec(&dir).await?;
        let plan_path = dir.join(PLAN_FILE);
        let plan = match fs::read_to_string(&plan_path).await {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(SpecKitError::Io { path: plan_path, source }),
        };

        let prompt = self
            .prompts
            .render(prompt::SPEC_TASKS)
            .var("spec", spec)
            .var("plan", plan)
            .build();
        let content = self.generate(PROJECT_MANAGER, prompt).await?;

        let tasks_file = dir.join(TASKS_FILE);
        fs::write(&tasks_file, &content).await.map_err(io_err(&tasks_file))?;
        info!(path = %tasks_file.display(), "tasks created");

        Ok(TasksResult { feature_name: feature_name.to_string(), tasks_file, content })
    }

    /// Every non-hidden feature directory, sorted by name.
    pub async fn list_features(&self) -> Result<Vec<FeatureSummary>, SpecKitError> {
        let mut entries = fs::read_dir(&self.specs_dir).await.map_err(io_err(&self.specs_dir))?;
        let mut features = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&self.specs_dir))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || name.starts_with('.') {
                continue;
            }
            let dir = entry.path();
            features.push(FeatureSummary {
                has_spec: dir.join(SPEC_FILE).exists(),
                has_plan: dir.join(PLAN_FILE).exists(),
                has_tasks: dir.join(TASKS_FILE).exists(),
                name,
            });
        }
        features.sort_by(|a, b| a.name.cmp(&b.name));
        info!(count = features.len(), "listed features");
        Ok(features)
    }
}
