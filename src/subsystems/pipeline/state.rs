//! State carried through the pipeline graph.

use serde::Serialize;

use crate::models::GitHubData;
use crate::subsystems::memory::Exchange;

/// Graph nodes. `Fetch` is the entry point; `Analyze` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Fetch,
    Analyze,
    Error,
}

impl Node {
    pub fn name(self) -> &'static str {
        match self {
            Node::Fetch => "fetch",
            Node::Analyze => "analyze",
            Node::Error => "error",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub question: String,
    pub user_id: String,
    /// Earlier exchanges with this user, oldest first.
    pub history: Vec<Exchange>,
    pub github_data: Option<GitHubData>,
    pub answer: Option<String>,
    pub commits_analyzed: usize,
    pub error: Option<String>,
}

impl PipelineState {
    pub fn new(question: impl Into<String>, user_id: impl Into<String>, history: Vec<Exchange>) -> Self {
        Self {
            question: question.into(),
            user_id: user_id.into(),
            history,
            github_data: None,
            answer: None,
            commits_analyzed: 0,
            error: None,
        }
    }
}
