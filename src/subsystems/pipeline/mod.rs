//! Question-answering workflow graph.
//!
//! ```text
//!   fetch ──(commits found)──► analyze ──► END
//!     │
//!     └──(fetch error | no commits)──► error ──► END
//! ```
//!
//! Nodes never return `Err`: a failure is recorded in
//! [`PipelineState::error`] and routing sends the run to the `error` node.
//! After every node the state is checkpointed under the caller's thread id.

pub mod checkpoint;
pub mod state;

pub use checkpoint::{Checkpoint, Checkpoints};
pub use state::{Node, PipelineState};

use tracing::{debug, error, info, warn};

use crate::llm::{ChatMessage, LlmProvider};
use crate::models::GitHubData;
use crate::prompt::{self, Prompts};
use crate::subsystems::github::GitHubClient;
use crate::subsystems::memory::Exchange;

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant answering questions about a developer's GitHub activity. Be concise.";
const NO_COMMITS_ANSWER: &str = "No recent commits found.";

pub struct Pipeline {
    github: GitHubClient,
    llm: LlmProvider,
    prompts: Prompts,
    lookback_hours: u32,
    checkpoints: Checkpoints,
}

impl Pipeline {
    pub fn new(github: GitHubClient, llm: LlmProvider, prompts: Prompts, lookback_hours: u32) -> Self {
        info!(lookback_hours, "pipeline graph ready");
        Self { github, llm, prompts, lookback_hours, checkpoints: Checkpoints::new() }
    }

    pub fn lookback_hours(&self) -> u32 {
        self.lookback_hours
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    /// Run the graph from the entry node to completion.
    pub async fn invoke(&self, mut state: PipelineState, thread_id: &str) -> PipelineState {
        let mut next = Some(Node::Fetch);
        while let Some(node) = next {
            debug!(%node, %thread_id, "entering node");
            state = match node {
                Node::Fetch => self.fetch(state).await,
                Node::Analyze => self.analyze(state).await,
                Node::Error => handle_error(state),
            };
            self.checkpoints.save(thread_id, node, &state).await;
            next = match node {
                Node::Fetch => Some(route_after_fetch(&state)),
                Node::Analyze | Node::Error => None,
            };
        }
        state
    }

    async fn fetch(&self, mut state: PipelineState) -> PipelineState {
        info!(user_id = %state.user_id, "fetching GitHub data");
        match self.github.recent_commits(self.lookback_hours).await {
            Ok(data) => {
                info!(commits = data.total_commits, "fetched commits");
                state.commits_analyzed = data.total_commits;
                state.github_data = Some(data);
            }
            Err(e) => {
                error!("GitHub fetch failed: {e}");
                state.error = Some(format!("GitHub fetch failed: {e}"));
            }
        }
        state
    }

    async fn analyze(&self, mut state: PipelineState) -> PipelineState {
        info!(question = %preview(&state.question), "analyzing with LLM");
        let Some(messages) = build_messages(
            &self.prompts,
            &state.question,
            state.github_data.as_ref(),
            &state.history,
        ) else {
            warn!("no commits in context");
            state.answer = Some(NO_COMMITS_ANSWER.to_string());
            return state;
        };

        match self.llm.complete(&messages).await {
            Ok(resp) => {
                info!(answer_chars = resp.text.chars().count(), "analysis complete");
                state.answer = Some(resp.text);
            }
            Err(e) => {
                error!("AI analysis failed: {e}");
                state.error = Some(format!("AI failed: {e}"));
            }
        }
        state
    }
}

fn handle_error(state: PipelineState) -> PipelineState {
    match &state.error {
        Some(e) => error!(user_id = %state.user_id, "pipeline error: {e}"),
        None => warn!(user_id = %state.user_id, "pipeline ended without commits to analyze"),
    }
    state
}

/// Route after `fetch`: failures and empty windows go to `error`.
pub fn route_after_fetch(state: &PipelineState) -> Node {
    if state.error.is_some() {
        warn!("routing to error handler due to fetch error");
        return Node::Error;
    }
    if state.commits_analyzed == 0 {
        warn!("no commits found, routing to error");
        return Node::Error;
    }
    debug!("routing to analysis");
    Node::Analyze
}

/// One line per commit: `[repo] summary (03:04 PM)`. `None` when there is nothing to analyze.
fn commit_context(data: &GitHubData) -> Option<String> {
    let lines: Vec<String> = data
        .commits
        .iter()
        .map(|c| {
            let summary = c.message.lines().next().unwrap_or_default().trim();
            format!("[{}] {} ({})", c.repo, summary, c.date.format("%I:%M %p"))
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn history_block(history: &[Exchange]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("Earlier questions from this user:\n");
    for e in history {
        out.push_str(&format!("Q: {}\nA: {}\n", e.question, e.answer));
    }
    out.push('\n');
    out
}

fn build_messages(
    prompts: &Prompts,
    question: &str,
    data: Option<&GitHubData>,
    history: &[Exchange],
) -> Option<Vec<ChatMessage>> {
    let commits = commit_context(data?)?;
    let user = prompts
        .render(prompt::COMMIT_QA)
        .var("commits", commits)
        .var("history", history_block(history))
        .var("question", question)
        .build();
    Some(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)])
}

/// First 50 characters, for log lines.
pub(crate) fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::models::Commit;
    use crate::subsystems::github::testing::{client, mock_github};
    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;

    fn pipeline(github: GitHubClient) -> Pipeline {
        let prompts = Prompts::new(tempfile::tempdir().unwrap().path());
        Pipeline::new(github, LlmProvider::Dummy(DummyProvider), prompts, 24)
    }

    fn exchange(q: &str, a: &str) -> Exchange {
        Exchange { question: q.into(), answer: a.into(), commits_analyzed: 1, timestamp: Utc::now() }
    }

    #[test]
    fn routing_after_fetch() {
        let mut s = PipelineState::new("q", "u", Vec::new());
        assert_eq!(route_after_fetch(&s), Node::Error);

        s.commits_analyzed = 3;
        assert_eq!(route_after_fetch(&s), Node::Analyze);

        s.error = Some("boom".into());
        assert_eq!(route_after_fetch(&s), Node::Error);
    }

    #[test]
    fn context_uses_first_line_and_12h_clock() {
        let data = GitHubData::new(
            vec![Commit {
                repo: "api".into(),
                message: "Fix login\n\nLonger body".into(),
                date: Utc.with_ymd_and_hms(2024, 2, 4, 15, 4, 0).unwrap(),
                sha: "abc1234".into(),
            }],
            24,
        );
        assert_eq!(commit_context(&data).unwrap(), "[api] Fix login (03:04 PM)");
        assert!(commit_context(&GitHubData::new(Vec::new(), 24)).is_none());
    }

    #[test]
    fn messages_include_history_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = Prompts::new(dir.path());
        let data = GitHubData::new(
            vec![Commit { repo: "r".into(), message: "m".into(), date: Utc::now(), sha: "s".into() }],
            24,
        );

        let msgs = build_messages(&prompts, "what now?", Some(&data), &[]).unwrap();
        assert_eq!(msgs[0].content, SYSTEM_PROMPT);
        assert!(msgs[1].content.starts_with("Based on these commits:"));
        assert!(msgs[1].content.contains("Answer: what now?"));
        assert!(!msgs[1].content.contains("Earlier questions"));

        let msgs = build_messages(&prompts, "and?", Some(&data), &[exchange("q0", "a0")]).unwrap();
        assert!(msgs[1].content.contains("Earlier questions from this user:\nQ: q0\nA: a0\n"));

        assert!(build_messages(&prompts, "q", None, &[]).is_none());
    }

    #[test]
    fn preview_truncates() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview(&"x".repeat(60)), format!("{}...", "x".repeat(50)));
    }

    #[tokio::test]
    async fn commits_flow_to_analysis() {
        let server = MockServer::start_async().await;
        mock_github(&server, &["fix parser", "add tests"]).await;
        let p = pipeline(client(&server));

        let out = p.invoke(PipelineState::new("what did I do?", "42", Vec::new()), "42").await;
        assert!(out.error.is_none());
        assert_eq!(out.commits_analyzed, 2);
        let answer = out.answer.unwrap();
        assert!(answer.starts_with("[echo] Based on these commits:"));
        assert!(answer.contains("[demo] fix parser"));
        assert_eq!(p.checkpoints().trail("42").await, vec![Node::Fetch, Node::Analyze]);
    }

    #[tokio::test]
    async fn empty_window_routes_to_error_without_message() {
        let server = MockServer::start_async().await;
        mock_github(&server, &[]).await;
        let p = pipeline(client(&server));

        let out = p.invoke(PipelineState::new("q", "7", Vec::new()), "7").await;
        assert!(out.error.is_none());
        assert!(out.answer.is_none());
        assert_eq!(out.commits_analyzed, 0);
        assert_eq!(p.checkpoints().latest("7").await.unwrap().node, Node::Error);
    }

    #[tokio::test]
    async fn fetch_failure_is_recorded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/user");
                then.status(500).body("down");
            })
            .await;
        let p = pipeline(client(&server));

        let out = p.invoke(PipelineState::new("q", "9", Vec::new()), "9").await;
        let err = out.error.unwrap();
        assert!(err.starts_with("GitHub fetch failed:"));
        assert!(err.contains("500"));
        assert_eq!(p.checkpoints().trail("9").await, vec![Node::Fetch, Node::Error]);
    }
}
