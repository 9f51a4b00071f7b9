//! CLI argument definitions using clap derive

use crate::query::Param;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Cachet - query result cache with table invalidation
///
/// Derives cache keys, resolves the tables a query depends on and
/// manages invalidation markers in the configured store.
#[derive(Parser, Debug)]
#[command(name = "cachet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CACHET_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the cache key of a query or table
    Key(KeyArgs),

    /// Resolve the tables a query depends on
    Resolve(ResolveArgs),

    /// Cache a result for a query
    Store(StoreArgs),

    /// Report whether a query would be served from cache
    Check(CheckArgs),

    /// Invalidate cached results depending on tables
    Invalidate(InvalidateArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the key command
#[derive(Parser, Debug)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub target: KeyTarget,
}

/// What to derive a key for
#[derive(Subcommand, Debug)]
pub enum KeyTarget {
    /// Key of a rendered query
    Query {
        /// Database alias
        #[arg(short, long, default_value = "default")]
        alias: String,

        /// Rendered SQL text
        #[arg(short, long)]
        sql: String,

        /// Bound parameter, repeatable (null, true, false, numbers or text)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<Param>,
    },

    /// Key of a table's invalidation marker
    Table {
        /// Table name
        table: String,

        /// Database alias
        #[arg(short, long, default_value = "default")]
        alias: String,
    },
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// JSON file holding a compiled query
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the store command
#[derive(Parser, Debug)]
pub struct StoreArgs {
    /// JSON file holding a compiled query
    pub file: PathBuf,

    /// Result rows as JSON
    #[arg(short, long, default_value = "[]")]
    pub rows: String,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// JSON file holding a compiled query
    pub file: PathBuf,
}

/// Arguments for the invalidate command
#[derive(Parser, Debug)]
pub struct InvalidateArgs {
    /// Tables to invalidate
    #[arg(required_unless_present = "sql")]
    pub tables: Vec<String>,

    /// Database alias
    #[arg(short, long, default_value = "default")]
    pub alias: String,

    /// Invalidate the known tables mentioned in a raw write statement
    #[arg(long, conflicts_with = "tables")]
    pub sql: Option<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for resolve
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// One table per line with its key
    Plain,
    /// JSON output
    Json,
}

/// Parse a command-line parameter into the value it most likely denotes
fn parse_param(s: &str) -> Result<Param, String> {
    let param = match s {
        "null" | "None" => Param::Null,
        "true" | "True" => Param::Bool(true),
        "false" | "False" => Param::Bool(false),
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                Param::Int(n)
            } else if let Some(f) = s.parse::<f64>().ok().filter(|f| f.is_finite()) {
                Param::Float(f)
            } else {
                Param::Text(s.to_string())
            }
        }
    };
    Ok(param)
}
