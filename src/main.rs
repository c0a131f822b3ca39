//! Activity bot entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build shared services (GitHub, LLM, memory, pipeline, spec kit)
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Run comms channels until shutdown

use activity_bot::{bootstrap, config, error, logger, prompt::Prompts, subsystems};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let state = bootstrap::build_services(&config, Prompts::default())?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("ctrl-c received, shutting down"),
            Err(e) => warn!("failed to listen for ctrl-c: {e}"),
        }
        signal_token.cancel();
    });

    print_startup_summary(&config);

    let comms = subsystems::comms::start(&config, state, shutdown.clone())?;
    let result = comms.join().await;

    shutdown.cancel();
    info!("bye");
    result
}

fn print_startup_summary(config: &config::Config) {
    let discord = if config.discord_should_load() {
        "enabled"
    } else if config.discord.enabled {
        "disabled (credentials missing)"
    } else {
        "disabled"
    };
    let model = match config.llm.provider.as_str() {
        "gemini" => config.llm.gemini.model.as_str(),
        "openai" | "openai-compatible" => config.llm.openai.model.as_str(),
        _ => "-",
    };

    println!("🚀 {} v{}", config.bot_name, env!("CARGO_PKG_VERSION"));
    println!("   api:      http://{}", config.api.bind_addr());
    println!("   discord:  {discord}");
    println!("   llm:      provider={} model={model}", config.llm.provider);
    println!("   lookback: {}h, timeout {}s", config.github.lookback_hours, config.pipeline.timeout_seconds);
    println!("   specs:    {}", config.spec_kit.specs_dir.display());
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: activity-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
