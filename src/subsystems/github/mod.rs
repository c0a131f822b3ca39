//! GitHub REST client for the authenticated user's recent commits.
//!
//! Only repositories pushed inside the lookback window are walked: the repo
//! listing is sorted by `pushed`, so the walk stops at the first stale repo.
//! A repository that fails to list (empty repo, revoked access…) is skipped
//! with a warning rather than failing the whole fetch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::models::{Commit, GitHubData};

const REPOS_PER_PAGE: usize = 100;
const SHORT_SHA_LEN: usize = 7;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GITHUB_TOKEN is not set")]
    MissingToken,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Cheap to clone: the HTTP client and cached login are shared.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_base_url: String,
    token: String,
    per_repo_limit: usize,
    max_repo_pages: u32,
    login: Arc<OnceCell<String>>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base_url", &self.api_base_url)
            .field("per_repo_limit", &self.per_repo_limit)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self, GitHubError> {
        let token = token.ok_or(GitHubError::MissingToken)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("activity-bot/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GitHubError::Request(format!("failed to build HTTP client: {e}")))?;

        info!("github client initialised");
        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
            per_repo_limit: config.per_repo_limit,
            max_repo_pages: config.max_repo_pages.max(1),
            login: Arc::new(OnceCell::new()),
        })
    }

    /// Login of the token's owner, resolved once and cached.
    pub async fn login(&self) -> Result<String, GitHubError> {
        self.login
            .get_or_try_init(|| async { self.fetch_user().await.map(|u| u.login) })
            .await
            .cloned()
    }

    /// Fetch the user's commits from the last `hours` hours.
    pub async fn recent_commits(&self, hours: u32) -> Result<GitHubData, GitHubError> {
        info!(hours, "fetching commits");
        let since = Utc::now() - chrono::Duration::hours(i64::from(hours));
        let login = self.login().await?;
        let repos = self.recently_pushed_repos(since).await?;
        debug!(repos = repos.len(), %login, "repos pushed inside window");

        let mut commits = Vec::new();
        for repo in &repos {
            match self.repo_commits(repo, &login, since).await {
                Ok(found) => commits.extend(found),
                Err(e) => {
                    warn!(repo = %repo.full_name, "error fetching commits: {e}");
                    continue;
                }
            }
        }

        info!(count = commits.len(), %login, "fetched commits");
        Ok(GitHubData::new(commits, hours))
    }

    /// `true` when the token authenticates against `GET /user`.
    pub async fn health_check(&self) -> bool {
        match self.fetch_user().await {
            Ok(_) => {
                debug!("github health check passed");
                true
            }
            Err(e) => {
                warn!("github health check failed: {e}");
                false
            }
        }
    }

    // ── Requests ──────────────────────────────────────────────────────

    async fn fetch_user(&self) -> Result<UserDto, GitHubError> {
        self.get_json(&format!("{}/user", self.api_base_url), &[]).await
    }

    async fn recently_pushed_repos(&self, since: DateTime<Utc>) -> Result<Vec<RepoDto>, GitHubError> {
        let url = format!("{}/user/repos", self.api_base_url);
        let per_page = REPOS_PER_PAGE.to_string();
        let mut out = Vec::new();

        for page in 1..=self.max_repo_pages {
            let page_str = page.to_string();
            let batch: Vec<RepoDto> = self
                .get_json(
                    &url,
                    &[
                        ("sort", "pushed"),
                        ("direction", "desc"),
                        ("per_page", per_page.as_str()),
                        ("page", page_str.as_str()),
                    ],
                )
                .await?;
            let full_page = batch.len() == REPOS_PER_PAGE;

            for repo in batch {
                if repo.pushed_at.is_some_and(|p| p < since) {
                    return Ok(out);
                }
                out.push(repo);
            }
            if !full_page {
                break;
            }
        }
        Ok(out)
    }

    async fn repo_commits(
        &self,
        repo: &RepoDto,
        login: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Commit>, GitHubError> {
        let url = format!("{}/repos/{}/commits", self.api_base_url, repo.full_name);
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let per_page = self.per_repo_limit.min(100).to_string();

        let items: Vec<CommitItemDto> = self
            .get_json(
                &url,
                &[("since", since.as_str()), ("author", login), ("per_page", per_page.as_str())],
            )
            .await?;

        Ok(items
            .into_iter()
            .take(self.per_repo_limit)
            .filter_map(|item| {
                let date = item
                    .commit
                    .author
                    .as_ref()
                    .or(item.commit.committer.as_ref())
                    .map(|sig| sig.date)?;
                Some(Commit {
                    repo: repo.name.clone(),
                    message: item.commit.message,
                    date,
                    sha: item.sha.chars().take(SHORT_SHA_LEN).collect(),
                })
            })
            .collect())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GitHubError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorDto>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(GitHubError::Status { status: status.as_u16(), message });
        }

        response.json::<T>().await.map_err(|e| GitHubError::Decode(e.to_string()))
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UserDto {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoDto {
    name: String,
    full_name: String,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CommitItemDto {
    sha: String,
    commit: CommitDetailDto,
}

#[derive(Debug, Deserialize)]
struct CommitDetailDto {
    message: String,
    #[serde(default)]
    author: Option<SignatureDto>,
    #[serde(default)]
    committer: Option<SignatureDto>,
}

#[derive(Debug, Deserialize)]
struct SignatureDto {
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ErrorDto {
    message: String,
}


#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(base: String) -> GitHubConfig {
        GitHubConfig {
            api_base_url: base,
            lookback_hours: 24,
            per_repo_limit: 2,
            max_repo_pages: 3,
            timeout_seconds: 5,
        }
    }

    fn iso(hours_ago: i64) -> String {
        (Utc::now() - chrono::Duration::hours(hours_ago)).to_rfc3339()
    }

    fn commit_json(sha: &str, message: &str) -> serde_json::Value {
        json!({ "sha": sha, "commit": { "message": message, "author": { "date": iso(1) } } })
    }

    fn repos_json(prefix: &str, count: usize, hours_ago: i64) -> serde_json::Value {
        let repos: Vec<_> = (0..count)
            .map(|i| {
                let name = format!("{prefix}{i}");
                json!({ "name": name, "full_name": format!("octo/{name}"), "pushed_at": iso(hours_ago) })
            })
            .collect();
        json!(repos)
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = GitHubClient::new(&config("http://localhost:0".into()), None).unwrap_err();
        assert!(matches!(err, GitHubError::MissingToken));
    }

    #[tokio::test]
    async fn recent_commits_walks_fresh_repos_and_skips_failures() {
        let server = MockServer::start_async().await;

        let user = server
            .mock_async(|when, then| {
                when.method(GET).path("/user").header("authorization", "Bearer ghp_test");
                then.status(200).json_body(json!({ "login": "octo" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/user/repos").query_param("sort", "pushed");
                then.status(200).json_body(json!([
                    { "name": "alpha", "full_name": "octo/alpha", "pushed_at": iso(2) },
                    { "name": "broken", "full_name": "octo/broken", "pushed_at": iso(3) },
                    { "name": "stale", "full_name": "octo/stale", "pushed_at": iso(72) }
                ]));
            })
            .await;
        let alpha = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/octo/alpha/commits")
                    .query_param("author", "octo")
                    .query_param("per_page", "2");
                then.status(200).json_body(json!([
                    commit_json("0123456789abcdef", "fix parser"),
                    commit_json("fedcba9876543210", "add tests"),
                    commit_json("aaaaaaaaaaaaaaaa", "over the limit")
                ]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/octo/broken/commits");
                then.status(409).json_body(json!({ "message": "Git Repository is empty." }));
            })
            .await;
        let stale = server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/octo/stale/commits");
                then.status(200).json_body(json!([]));
            })
            .await;

        let client = GitHubClient::new(&config(server.base_url()), Some("ghp_test".into())).unwrap();
        let data = client.recent_commits(24).await.unwrap();

        assert_eq!(data.total_commits, 2);
        assert_eq!(data.time_range, "last 24 hours");
        assert_eq!(data.commits[0].repo, "alpha");
        assert_eq!(data.commits[0].sha, "0123456");
        assert_eq!(data.commits[1].message, "add tests");
        alpha.assert_async().await;
        assert_eq!(stale.hits_async().await, 0);

        // Login is cached across calls.
        client.recent_commits(24).await.unwrap();
        assert_eq!(user.hits_async().await, 1);
    }

    #[tokio::test]
    async fn full_repo_page_fetches_the_next_one() {
        let server = MockServer::start_async().await;
        let page1 = server
            .mock_async(|when, then| {
                when.method(GET).path("/user/repos").query_param("page", "1").query_param("per_page", "100");
                then.status(200).json_body(repos_json("a", REPOS_PER_PAGE, 1));
            })
            .await;
        let page2 = server
            .mock_async(|when, then| {
                when.method(GET).path("/user/repos").query_param("page", "2");
                then.status(200).json_body(json!([
                    { "name": "fresh", "full_name": "octo/fresh", "pushed_at": iso(2) },
                    { "name": "stale", "full_name": "octo/stale", "pushed_at": iso(72) },
                    { "name": "older", "full_name": "octo/older", "pushed_at": iso(96) }
                ]));
            })
            .await;
        let page3 = server
            .mock_async(|when, then| {
                when.method(GET).path("/user/repos").query_param("page", "3");
                then.status(200).json_body(json!([]));
            })
            .await;

        let client = GitHubClient::new(&config(server.base_url()), Some("ghp_test".into())).unwrap();
        let repos = client.recently_pushed_repos(Utc::now() - chrono::Duration::hours(24)).await.unwrap();

        assert_eq!(repos.len(), REPOS_PER_PAGE + 1);
        assert_eq!(repos.last().unwrap().name, "fresh");
        page1.assert_async().await;
        page2.assert_async().await;
        assert_eq!(page3.hits_async().await, 0);
    }

    #[tokio::test]
    async fn repo_walk_stops_at_the_page_cap() {
        let server = MockServer::start_async().await;
        let page1 = server
            .mock_async(|when, then| {
                when.method(GET).path("/user/repos").query_param("page", "1");
                then.status(200).json_body(repos_json("a", REPOS_PER_PAGE, 1));
            })
            .await;
        let page2 = server
            .mock_async(|when, then| {
                when.method(GET).path("/user/repos").query_param("page", "2");
                then.status(200).json_body(repos_json("b", REPOS_PER_PAGE, 1));
            })
            .await;
        let page3 = server
            .mock_async(|when, then| {
                when.method(GET).path("/user/repos").query_param("page", "3");
                then.status(200).json_body(repos_json("c", REPOS_PER_PAGE, 1));
            })
            .await;

        let mut cfg = config(server.base_url());
        cfg.max_repo_pages = 2;
        let client = GitHubClient::new(&cfg, Some("ghp_test".into())).unwrap();
        let repos = client.recently_pushed_repos(Utc::now() - chrono::Duration::hours(24)).await.unwrap();

        assert_eq!(repos.len(), 2 * REPOS_PER_PAGE);
        assert_eq!(repos.last().unwrap().name, "b99");
        page1.assert_async().await;
        page2.assert_async().await;
        assert_eq!(page3.hits_async().await, 0);
    }

    #[tokio::test]
    async fn bad_credentials_fail_the_fetch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/user");
                then.status(401).json_body(json!({ "message": "Bad credentials" }));
            })
            .await;

        let client = GitHubClient::new(&config(server.base_url()), Some("nope".into())).unwrap();
        let err = client.recent_commits(24).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 401: Bad credentials");
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn health_check_passes_with_valid_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/user");
                then.status(200).json_body(json!({ "login": "octo" }));
            })
            .await;

        let client = GitHubClient::new(&config(server.base_url()), Some("ok".into())).unwrap();
        assert!(client.health_check().await);
    }
}
