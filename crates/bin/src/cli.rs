//! CLI argument definitions for the ggconfigd binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Storage backend type.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Backend {
    /// SQLite database (default, production-ready).
    Sqlite,
    /// In-memory only, for development and ephemeral deployments.
    Inmemory,
}

/// ggconfigd: a persistent, hierarchical configuration store server.
#[derive(Parser, Debug)]
#[command(name = "ggconfigd")]
#[command(about = "gg_config: hierarchical configuration store with subscriptions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output in JSON format instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gg_config RPC server.
    Serve(ServeArgs),
    /// Check health of a running server.
    Health(HealthArgs),
    /// Show store information (backend, top-level entry count).
    Info(InfoArgs),
    /// Read, write, or delete a configuration entry directly against the
    /// local backend, without going through a running server.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Shared backend configuration for commands that access storage directly.
#[derive(clap::Args, Debug)]
pub struct BackendConfig {
    /// Storage backend to use.
    #[arg(short, long, default_value = "sqlite", env = "GGCONFIG_BACKEND")]
    pub backend: Backend,

    /// Data directory for storage files (SQLite: stores ggconfig.db).
    #[arg(short = 'D', long, env = "GGCONFIG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

/// Arguments for the `serve` command.
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 3000, env = "GGCONFIG_PORT")]
    pub port: u16,

    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "GGCONFIG_HOST")]
    pub host: String,

    #[command(flatten)]
    pub backend_config: BackendConfig,
}

/// Arguments for the `health` command.
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server to check.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    pub url: String,

    /// Timeout in seconds.
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}

/// Arguments for the `info` command.
#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub backend_config: BackendConfig,
}

/// `config` subcommands: direct (serverless) access to the local store.
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Read the value at a path (segments separated by `/`).
    Get(ConfigGetArgs),
    /// Write a scalar value at a path.
    Set(ConfigSetArgs),
    /// Delete the subtree rooted at a path.
    Delete(ConfigDeleteArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigGetArgs {
    /// Slash-separated path, e.g. `component/setting`.
    pub path: String,

    #[command(flatten)]
    pub backend_config: BackendConfig,
}

#[derive(clap::Args, Debug)]
pub struct ConfigSetArgs {
    /// Slash-separated path, e.g. `component/setting`.
    pub path: String,

    /// Value to write, parsed as JSON if possible, otherwise stored as a
    /// UTF-8 string.
    pub value: String,

    /// Explicit write timestamp (milliseconds since epoch). Defaults to
    /// the current wall-clock time.
    #[arg(long)]
    pub timestamp: Option<i64>,

    #[command(flatten)]
    pub backend_config: BackendConfig,
}

#[derive(clap::Args, Debug)]
pub struct ConfigDeleteArgs {
    /// Slash-separated path, e.g. `component/setting`.
    pub path: String,

    #[command(flatten)]
    pub backend_config: BackendConfig,
}
