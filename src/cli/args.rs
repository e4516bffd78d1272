//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Stowage - build cache save and restore
///
/// Packs build directories into tar archives kept in object storage under
/// keys rendered from templates, and unpacks them on later builds.
#[derive(Parser, Debug)]
#[command(name = "stowage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path (defaults to stowage.toml in the working directory)
    #[arg(short, long, global = true, env = "STOWAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Working directory mounts are relative to (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    pub workdir: Option<PathBuf>,

    /// Root directory of the filesystem storage backend
    #[arg(long, global = true, env = "STOWAGE_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive mounts and upload them to the cache
    Rebuild(RebuildArgs),

    /// Download a cached archive and unpack it
    Restore(RestoreArgs),

    /// Delete cached archives older than a threshold
    Flush(FlushArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Templates naming a cache object
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Cache directory template, <bucket>/<path>
    #[arg(long, env = "STOWAGE_PATH")]
    pub path: String,

    /// Archive file name template; .tar, .tgz or .tar.gz (default: from config)
    #[arg(long, env = "STOWAGE_FILENAME")]
    pub filename: Option<String>,

    /// Template variables, available as {{ .KEY }}
    #[command(flatten)]
    pub meta: MetaArgs,
}

/// Template variables
#[derive(Args, Debug, Clone, Default)]
pub struct MetaArgs {
    /// Template variable (KEY=VALUE), repeatable
    #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub meta: Vec<(String, String)>,
}

/// Arguments for the rebuild command
#[derive(Parser, Debug)]
pub struct RebuildArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Paths to archive, relative to the working directory (comma-separated)
    #[arg(long, env = "STOWAGE_MOUNT", value_delimiter = ',', required = true)]
    pub mount: Vec<PathBuf>,
}

/// Arguments for the restore command
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Directory template tried when the primary cache cannot be restored
    #[arg(long, env = "STOWAGE_FALLBACK_PATH")]
    pub fallback_path: Option<String>,

    /// Fail instead of warning when nothing could be restored
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the flush command
#[derive(Parser, Debug)]
pub struct FlushArgs {
    /// Cache directory template; the prefix cleaned when --flush-path is not given
    #[arg(long, env = "STOWAGE_PATH")]
    pub path: Option<String>,

    /// Prefix template to clean, <bucket>/<path>
    #[arg(long, env = "STOWAGE_FLUSH_PATH", required_unless_present = "path")]
    pub flush_path: Option<String>,

    /// Archive file name template (default: from config)
    #[arg(long, env = "STOWAGE_FILENAME")]
    pub filename: Option<String>,

    /// Remove entries older than N days (default: from config)
    #[arg(long, env = "STOWAGE_FLUSH_AGE")]
    pub age: Option<u32>,

    #[command(flatten)]
    pub meta: MetaArgs,
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

    /// Write a default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Parse a template variable in KEY=VALUE format
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE format: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
