//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`), then applies
//! env overrides. Secrets (tokens, API keys) are never read from TOML; they
//! come from the environment, which `main` seeds from `.env` first.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Web API listener configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl ApiConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// GitHub REST client configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_base_url: String,
    /// Commit window used by the pipeline's fetch step.
    pub lookback_hours: u32,
    /// Maximum commits kept per repository.
    pub per_repo_limit: usize,
    /// Upper bound on `/user/repos` pages walked per fetch.
    pub max_repo_pages: u32,
    pub timeout_seconds: u64,
}

/// Settings shared by the HTTP-backed LLM providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider: `"gemini"`, `"openai"` or `"dummy"`.
    pub provider: String,
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Hard limit on a single question's pipeline run.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// FIFO cap on stored exchanges per user.
    pub history_cap: usize,
    /// Exchanges fed back into the prompt and returned by default.
    pub history_limit: usize,
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SpecKitConfig {
    /// Already resolved against `work_dir` when relative.
    pub specs_dir: PathBuf,
}

/// Secrets sourced from the environment only.
#[derive(Clone, Default)]
pub struct Secrets {
    pub github_token: Option<String>,
    pub llm_api_key: Option<String>,
    pub discord_token: Option<String>,
    pub discord_public_key: Option<String>,
    pub discord_application_id: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("github_token", &mask(&self.github_token))
            .field("llm_api_key", &mask(&self.llm_api_key))
            .field("discord_token", &mask(&self.discord_token))
            .field("discord_public_key", &mask(&self.discord_public_key))
            .field("discord_application_id", &mask(&self.discord_application_id))
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            github_token: var("GITHUB_TOKEN"),
            llm_api_key: var("GOOGLE_API_KEY").or_else(|| var("LLM_API_KEY")),
            discord_token: var("DISCORD_TOKEN"),
            discord_public_key: var("DISCORD_PUBLIC_KEY"),
            discord_application_id: var("DISCORD_APPLICATION_ID"),
        }
    }
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Optional log file (absolute or relative to `work_dir`).
    pub log_file: Option<PathBuf>,
    pub api: ApiConfig,
    pub github: GitHubConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub memory: MemoryConfig,
    pub discord: DiscordConfig,
    pub spec_kit: SpecKitConfig,
    pub secrets: Secrets,
}

impl Config {
    /// Returns `true` if the Discord interactions channel should be loaded.
    pub fn discord_should_load(&self) -> bool {
        self.discord.enabled
            && self.secrets.discord_public_key.is_some()
            && self.secrets.discord_application_id.is_some()
    }
}

/// Env-sourced overrides applied on top of the TOML values.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub api_host: Option<String>,
    pub api_port: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            work_dir: env::var("ACTIVITY_BOT_WORK_DIR").ok(),
            log_level: env::var("ACTIVITY_BOT_LOG_LEVEL").ok(),
            api_host: env::var("API_HOST").ok(),
            api_port: env::var("API_PORT").ok(),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    supervisor: RawSupervisor,
    #[serde(default)]
    api: RawApi,
    #[serde(default)]
    github: RawGitHub,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    pipeline: RawPipeline,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    discord: RawDiscord,
    #[serde(default)]
    spec_kit: RawSpecKit,
}

#[derive(Deserialize)]
struct RawSupervisor {
    bot_name: String,
    work_dir: String,
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

#[derive(Deserialize)]
struct RawApi {
    #[serde(default = "default_api_host")]
    host: String,
    #[serde(default = "default_api_port")]
    port: u16,
}

impl Default for RawApi {
    fn default() -> Self {
        Self { host: default_api_host(), port: default_api_port() }
    }
}

fn default_api_host() -> String { "0.0.0.0".to_string() }
fn default_api_port() -> u16 { 8000 }

#[derive(Deserialize)]
struct RawGitHub {
    #[serde(default = "default_github_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_lookback_hours")]
    lookback_hours: u32,
    #[serde(default = "default_per_repo_limit")]
    per_repo_limit: usize,
    #[serde(default = "default_max_repo_pages")]
    max_repo_pages: u32,
    #[serde(default = "default_github_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawGitHub {
    fn default() -> Self {
        Self {
            api_base_url: default_github_api_base_url(),
            lookback_hours: default_lookback_hours(),
            per_repo_limit: default_per_repo_limit(),
            max_repo_pages: default_max_repo_pages(),
            timeout_seconds: default_github_timeout_seconds(),
        }
    }
}

fn default_github_api_base_url() -> String { "https://api.github.com".to_string() }
fn default_lookback_hours() -> u32 { 24 }
fn default_per_repo_limit() -> usize { 20 }
fn default_max_repo_pages() -> u32 { 5 }
fn default_github_timeout_seconds() -> u64 { 30 }

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    gemini: RawProvider,
    #[serde(default)]
    openai: RawProvider,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            gemini: RawProvider::default(),
            openai: RawProvider::default(),
        }
    }
}

/// Unset fields fall back to the provider's built-in defaults in [`RawProvider::resolve`].
#[derive(Deserialize, Default)]
struct RawProvider {
    #[serde(default)]
    api_base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

impl RawProvider {
    fn resolve(self, base_url: &str, model: &str) -> ProviderConfig {
        ProviderConfig {
            api_base_url: self.api_base_url.unwrap_or_else(|| base_url.to_string()),
            model: self.model.unwrap_or_else(|| model.to_string()),
            temperature: self.temperature.unwrap_or(0.7),
            timeout_seconds: self.timeout_seconds.unwrap_or(60),
        }
    }
}

fn default_llm_provider() -> String { "gemini".to_string() }
const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MODEL: &str = "gemini-pro";
const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Deserialize)]
struct RawPipeline {
    #[serde(default = "default_pipeline_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawPipeline {
    fn default() -> Self {
        Self { timeout_seconds: default_pipeline_timeout_seconds() }
    }
}

fn default_pipeline_timeout_seconds() -> u64 { 60 }

#[derive(Deserialize)]
struct RawMemory {
    #[serde(default = "default_history_cap")]
    history_cap: usize,
    #[serde(default = "default_history_limit")]
    history_limit: usize,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self { history_cap: default_history_cap(), history_limit: default_history_limit() }
    }
}

fn default_history_cap() -> usize { 100 }
fn default_history_limit() -> usize { 5 }

#[derive(Deserialize)]
struct RawDiscord {
    /// Defaults to `true`; the channel still needs credentials to load.
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_discord_api_base_url")]
    api_base_url: String,
}

impl Default for RawDiscord {
    fn default() -> Self {
        Self { enabled: true, api_base_url: default_discord_api_base_url() }
    }
}

fn default_discord_api_base_url() -> String { "https://discord.com/api/v10".to_string() }

#[derive(Deserialize)]
struct RawSpecKit {
    #[serde(default = "default_specs_dir")]
    specs_dir: String,
}

impl Default for RawSpecKit {
    fn default() -> Self {
        Self { specs_dir: default_specs_dir() }
    }
}

fn default_specs_dir() -> String { "specs".to_string() }

fn default_true() -> bool {
    true
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (or `config/default.toml`), then apply env overrides
/// and read secrets from the environment.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH));
    load_from(path, &Overrides::from_env(), Secrets::from_env())
}

/// Loader that accepts an explicit path, overrides and secrets.
/// Tests pass these directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides, secrets: Secrets) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.supervisor;

    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&s.work_dir));
    let log_level = overrides.log_level.clone().unwrap_or(s.log_level);
    let log_file = s.log_file.map(|f| resolve_under(&work_dir, &f));

    let api_port = match overrides.api_port.as_deref() {
        Some(p) => p
            .trim()
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("invalid API_PORT '{p}': {e}")))?,
        None => parsed.api.port,
    };

    if parsed.github.per_repo_limit == 0 {
        return Err(AppError::Config("github.per_repo_limit must be at least 1".into()));
    }
    if parsed.memory.history_cap == 0 {
        return Err(AppError::Config("memory.history_cap must be at least 1".into()));
    }

    Ok(Config {
        bot_name: s.bot_name,
        log_level,
        log_file,
        api: ApiConfig {
            host: overrides.api_host.clone().unwrap_or(parsed.api.host),
            port: api_port,
        },
        github: GitHubConfig {
            api_base_url: parsed.github.api_base_url,
            lookback_hours: parsed.github.lookback_hours,
            per_repo_limit: parsed.github.per_repo_limit,
            max_repo_pages: parsed.github.max_repo_pages,
            timeout_seconds: parsed.github.timeout_seconds,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            gemini: parsed.llm.gemini.resolve(GEMINI_API_BASE_URL, GEMINI_MODEL),
            openai: parsed.llm.openai.resolve(OPENAI_API_BASE_URL, OPENAI_MODEL),
        },
        pipeline: PipelineConfig { timeout_seconds: parsed.pipeline.timeout_seconds },
        memory: MemoryConfig {
            history_cap: parsed.memory.history_cap,
            history_limit: parsed.memory.history_limit,
        },
        discord: DiscordConfig {
            enabled: parsed.discord.enabled,
            api_base_url: parsed.discord.api_base_url,
        },
        spec_kit: SpecKitConfig {
            specs_dir: resolve_under(&work_dir, &parsed.spec_kit.specs_dir),
        },
        work_dir,
        secrets,
    })
}

/// Resolve `path` against `base` unless it is already absolute (or `~`-rooted).
fn resolve_under(base: &Path, path: &str) -> PathBuf {
    let p = expand_home(path);
    if p.is_absolute() { p } else { base.join(p) }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: dummy LLM, no secrets, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        let provider = |url: &str| ProviderConfig {
            api_base_url: url.into(),
            model: "test-model".into(),
            temperature: 0.0,
            timeout_seconds: 1,
        };
        Self {
            bot_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            log_file: None,
            api: ApiConfig { host: "127.0.0.1".into(), port: 0 },
            github: GitHubConfig {
                api_base_url: "http://localhost:0".into(),
                lookback_hours: 24,
                per_repo_limit: 20,
                max_repo_pages: 2,
                timeout_seconds: 2,
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                gemini: provider("http://localhost:0/v1beta"),
                openai: provider("http://localhost:0/v1/chat/completions"),
            },
            pipeline: PipelineConfig { timeout_seconds: 5 },
            memory: MemoryConfig { history_cap: 10, history_limit: 5 },
            discord: DiscordConfig { enabled: false, api_base_url: "http://localhost:0".into() },
            spec_kit: SpecKitConfig { specs_dir: work_dir.join("specs") },
            secrets: Secrets::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[supervisor]
bot_name = "test-bot"
work_dir = "/tmp/activity-bot"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn load_minimal(overrides: &Overrides) -> Result<Config, AppError> {
        let f = write_toml(MINIMAL_TOML);
        load_from(f.path(), overrides, Secrets::default())
    }

    #[test]
    fn parse_basic_config_with_defaults() {
        let cfg = load_minimal(&Overrides::default()).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.api.bind_addr(), "0.0.0.0:8000");
        assert_eq!(cfg.github.lookback_hours, 24);
        assert_eq!(cfg.github.per_repo_limit, 20);
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.llm.gemini.model, "gemini-pro");
        assert!((cfg.llm.gemini.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.pipeline.timeout_seconds, 60);
        assert_eq!(cfg.memory.history_limit, 5);
        assert_eq!(cfg.spec_kit.specs_dir, PathBuf::from("/tmp/activity-bot/specs"));
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn provider_sections_override_defaults() {
        let f = write_toml(&format!(
            "{MINIMAL_TOML}\n[llm]\ndefault = \"openai\"\n[llm.openai]\nmodel = \"gpt-5-mini\"\ntimeout_seconds = 9\n"
        ));
        let cfg = load_from(f.path(), &Overrides::default(), Secrets::default()).unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.openai.model, "gpt-5-mini");
        assert_eq!(cfg.llm.openai.timeout_seconds, 9);
        assert_eq!(cfg.llm.openai.api_base_url, OPENAI_API_BASE_URL);
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.activity-bot");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".activity-bot"));
    }

    #[test]
    fn relative_path_unchanged() {
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(
            Path::new("/nonexistent/config.toml"),
            &Overrides::default(),
            Secrets::default(),
        );
        assert!(result.unwrap_err().to_string().contains("config error"));
    }

    #[test]
    fn env_overrides_apply() {
        let overrides = Overrides {
            work_dir: Some("/tmp/override".into()),
            log_level: Some("debug".into()),
            api_host: Some("127.0.0.1".into()),
            api_port: Some("9001".into()),
        };
        let cfg = load_minimal(&overrides).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/override"));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.api.bind_addr(), "127.0.0.1:9001");
        assert!(cfg.spec_kit.specs_dir.starts_with("/tmp/override"));
    }

    #[test]
    fn invalid_port_override_errors() {
        let overrides = Overrides { api_port: Some("eighty".into()), ..Default::default() };
        let msg = load_minimal(&overrides).unwrap_err().to_string();
        assert!(msg.contains("API_PORT"));
    }

    #[test]
    fn discord_requires_credentials() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides::default(), Secrets::default()).unwrap();
        assert!(!cfg.discord_should_load());

        let secrets = Secrets {
            discord_public_key: Some("ab".repeat(32)),
            discord_application_id: Some("123".into()),
            ..Default::default()
        };
        let cfg = load_from(f.path(), &Overrides::default(), secrets).unwrap();
        assert!(cfg.discord_should_load());
    }

    #[test]
    fn secrets_debug_is_masked() {
        let secrets = Secrets { github_token: Some("ghp_secret".into()), ..Default::default() };
        let dbg = format!("{secrets:?}");
        assert!(!dbg.contains("ghp_secret"));
        assert!(dbg.contains("<set>"));
    }
}
