//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::CachetResult;
use console::style;

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> CachetResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init(manager, force).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> CachetResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    println!(
        "# store directory: {}",
        ConfigManager::store_dir(config).display()
    );
    Ok(())
}

/// Write a default config file
///
/// Runs without loading the current file, so it can replace one that no
/// longer parses.
pub async fn init(manager: &ConfigManager, force: bool) -> CachetResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "{} Config already exists at {}",
            style("!").yellow(),
            path.display()
        );
        println!("  {}", style("Use --force to overwrite").dim());
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration initialized at {}",
        style("✓").green(),
        path.display()
    );

    Ok(())
}
