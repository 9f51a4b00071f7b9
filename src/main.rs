//! Cachet - query result cache with table invalidation
//!
//! CLI entry point that dispatches to subcommands.

use cachet::cli::args::{ConfigAction, ConfigArgs};
use cachet::cli::{commands, Cli, Commands};
use cachet::config::ConfigManager;
use cachet::error::CachetResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CachetResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Init must work even when the existing file does not parse
    if let Commands::Config(ConfigArgs {
        action: Some(ConfigAction::Init { force }),
    }) = &cli.command
    {
        init_logging(cli.verbose, false);
        return commands::config::init(&config_manager, *force).await;
    }

    let config = config_manager.load().await?;
    init_logging(cli.verbose, config.general.log_format == "json");

    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Key(args) => commands::key(args, &config).await,
        Commands::Resolve(args) => commands::resolve(args, &config).await,
        Commands::Store(args) => commands::store(args, &config).await,
        Commands::Check(args) => commands::check(args, &config).await,
        Commands::Invalidate(args) => commands::invalidate(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("cachet=warn"),
        1 => EnvFilter::new("cachet=info"),
        _ => EnvFilter::new("cachet=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }
}
