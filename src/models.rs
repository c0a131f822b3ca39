//! Data types shared across subsystems and exposed over the web API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest question accepted from any channel.
pub const MAX_QUESTION_CHARS: usize = 2000;
const MAX_USER_ID_CHARS: usize = 64;

/// A single commit authored by the tracked user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub repo: String,
    pub message: String,
    pub date: DateTime<Utc>,
    /// Abbreviated (7 char) SHA.
    pub sha: String,
}

/// Commits gathered for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubData {
    pub commits: Vec<Commit>,
    pub total_commits: usize,
    pub time_range: String,
}

impl GitHubData {
    pub fn new(commits: Vec<Commit>, hours: u32) -> Self {
        Self {
            total_commits: commits.len(),
            commits,
            time_range: format!("last {hours} hours"),
        }
    }
}

/// A question submitted over the web API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub user_id: String,
    pub question: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Question {
    /// Check the field constraints, returning a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_user_id(&self.user_id) {
            return Err(format!(
                "user_id must be 1-{MAX_USER_ID_CHARS} characters of [A-Za-z0-9_.-]"
            ));
        }
        validate_question_text(&self.question)
    }
}

/// Reject blank or oversized question text.
pub fn validate_question_text(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("question must not be empty".to_string());
    }
    if text.chars().count() > MAX_QUESTION_CHARS {
        return Err(format!("question must be at most {MAX_QUESTION_CHARS} characters"));
    }
    Ok(())
}

/// User ids double as directory names in the memory store.
pub fn is_valid_user_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_USER_ID_CHARS
        && id != "."
        && id != ".."
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// The bot's reply to an answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub commits_analyzed: usize,
    pub timestamp: DateTime<Utc>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub discord_bot: bool,
    pub github_connected: bool,
    pub ai_connected: bool,
    pub memory_connected: bool,
}

impl HealthCheck {
    pub fn from_checks(discord_bot: bool, github: bool, ai: bool, memory: bool) -> Self {
        let status = if github && ai { "healthy" } else { "degraded" };
        Self {
            status: status.to_string(),
            discord_bot,
            github_connected: github,
            ai_connected: ai,
            memory_connected: memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_timestamp_defaults_to_now() {
        let before = Utc::now();
        let q: Question =
            serde_json::from_str(r#"{"user_id":"42","question":"what did I do?"}"#).unwrap();
        assert!(q.timestamp >= before);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn question_validation_rejects_bad_input() {
        let mut q = Question { user_id: "u1".into(), question: "   ".into(), timestamp: Utc::now() };
        assert!(q.validate().unwrap_err().contains("empty"));

        q.question = "x".repeat(MAX_QUESTION_CHARS + 1);
        assert!(q.validate().unwrap_err().contains("at most"));

        q.question = "ok".into();
        q.user_id = "../etc".into();
        assert!(q.validate().unwrap_err().contains("user_id"));
    }

    #[test]
    fn user_id_rules() {
        assert!(is_valid_user_id("123456789012345678"));
        assert!(is_valid_user_id("alice.dev-01"));
        assert!(!is_valid_user_id(""));
        assert!(!is_valid_user_id(".."));
        assert!(!is_valid_user_id("a/b"));
        assert!(!is_valid_user_id(&"a".repeat(65)));
    }

    #[test]
    fn github_data_counts_commits() {
        let commit = Commit {
            repo: "r".into(),
            message: "m".into(),
            date: Utc::now(),
            sha: "abcdef0".into(),
        };
        let data = GitHubData::new(vec![commit.clone(), commit], 24);
        assert_eq!(data.total_commits, 2);
        assert_eq!(data.time_range, "last 24 hours");
    }

    #[test]
    fn health_check_json_shape() {
        let h = HealthCheck::from_checks(false, true, true, true);
        let v = serde_json::to_value(&h).unwrap();
        assert_eq!(v["status"], "healthy");
        assert_eq!(v["discord_bot"], false);
        assert_eq!(v["memory_connected"], true);

        let degraded = HealthCheck::from_checks(true, false, true, true);
        assert_eq!(degraded.status, "degraded");
    }
}
