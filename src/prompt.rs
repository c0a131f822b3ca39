//! Prompt templates with `{{key}}` substitution.
//!
//! Templates live under `config/prompts/`. Each one is also compiled into the
//! binary, so a deployment without the directory still works; a file on disk
//! takes precedence over the built-in copy, which lets operators tune wording
//! without rebuilding.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const DEFAULT_PROMPTS_DIR: &str = "config/prompts";

pub const COMMIT_QA: &str = "commit_qa.md";
pub const SPEC_SPECIFY: &str = "spec_specify.md";
pub const SPEC_CONTRACTS: &str = "spec_contracts.md";
pub const SPEC_PLAN: &str = "spec_plan.md";
pub const SPEC_TASKS: &str = "spec_tasks.md";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("static regex"));

fn builtin(name: &str) -> Option<&'static str> {
    match name {
        COMMIT_QA => Some(include_str!("../config/prompts/commit_qa.md")),
        SPEC_SPECIFY => Some(include_str!("../config/prompts/spec_specify.md")),
        SPEC_CONTRACTS => Some(include_str!("../config/prompts/spec_contracts.md")),
        SPEC_PLAN => Some(include_str!("../config/prompts/spec_plan.md")),
        SPEC_TASKS => Some(include_str!("../config/prompts/spec_tasks.md")),
        _ => None,
    }
}

/// Cheap to clone; holds only the template directory.
#[derive(Debug, Clone)]
pub struct Prompts {
    dir: PathBuf,
}

impl Default for Prompts {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPTS_DIR)
    }
}

impl Prompts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Start rendering the template `name`.
    ///
    /// Falls back to the built-in copy when the file is missing; unknown names
    /// with no file render as an empty string.
    pub fn render(&self, name: &str) -> PromptBuilder {
        let path = self.dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                tracing::debug!("prompt: '{}' not found on disk, using built-in", path.display());
                builtin(name).unwrap_or_default().to_string()
            }
        };
        PromptBuilder { template: text.trim().to_string(), vars: HashMap::new() }
    }
}

/// Substitution is applied once, at [`build`](PromptBuilder::build) time, in a
/// single pass over the template: substituted values are never rescanned.
pub struct PromptBuilder {
    template: String,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| match self.vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
