//! The shipped config/default.toml must load and match the documented defaults.

use std::path::Path;

use activity_bot::config::{self, Overrides, Secrets};

#[test]
fn default_config_loads() {
    let cfg = config::load_from(Path::new(config::DEFAULT_CONFIG_PATH), &Overrides::default(), Secrets::default())
        .expect("config/default.toml should parse");

    assert_eq!(cfg.bot_name, "activity-bot");
    assert_eq!(cfg.api.bind_addr(), "0.0.0.0:8000");
    assert_eq!(cfg.github.lookback_hours, 24);
    assert_eq!(cfg.github.per_repo_limit, 20);
    assert_eq!(cfg.llm.provider, "gemini");
    assert_eq!(cfg.llm.gemini.model, "gemini-pro");
    assert!((cfg.llm.gemini.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(cfg.pipeline.timeout_seconds, 60);
    assert_eq!(cfg.memory.history_limit, 5);
    assert!(cfg.spec_kit.specs_dir.ends_with("specs"));
    assert!(cfg.spec_kit.specs_dir.starts_with(&cfg.work_dir));
}

#[test]
fn discord_stays_off_without_credentials() {
    let cfg = config::load_from(Path::new(config::DEFAULT_CONFIG_PATH), &Overrides::default(), Secrets::default())
        .unwrap();
    assert!(cfg.discord.enabled);
    assert!(!cfg.discord_should_load());
}
