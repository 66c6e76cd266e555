mod api;
mod commands;
mod exchange;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use relay_common::config::{load_config, RelayConfig};
use relay_common::error::RelayError;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Master-aware, failover dispatch to application replicas", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Credential, as `id:signature:loginPhrase` or a query string
    #[arg(long, env = "RELAY_AUTH", hide_env_values = true)]
    auth: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
pub struct TargetArgs {
    /// Application name
    pub app: String,

    /// Component of a multi-component application
    #[arg(long)]
    pub component: Option<String>,

    /// Candidate node (`host` or `host:port`), repeatable
    #[arg(long = "node")]
    pub nodes: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the observed master of an application
    Master { app: String },
    /// Show which node is serving a domain right now
    ServingNode { domain: String },
    /// Fetch application logs
    Logs {
        #[command(flatten)]
        target: TargetArgs,
        /// Only the last N lines
        #[arg(long)]
        lines: Option<u32>,
    },
    /// List a folder in the application volume
    Ls {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(default_value = "")]
        folder: String,
    },
    /// Download a file from the application volume
    Download {
        #[command(flatten)]
        target: TargetArgs,
        file: String,
        /// Write to this path instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Upload a local file into a volume folder
    Upload {
        #[command(flatten)]
        target: TargetArgs,
        file: PathBuf,
        #[arg(long, default_value = "")]
        folder: String,
    },
    /// Show container resource usage
    Stats {
        #[command(flatten)]
        target: TargetArgs,
        /// Volume size used for the disk percentage
        #[arg(long, default_value_t = 0)]
        disk_limit: u64,
    },
    /// Run a command inside the application container
    Exec {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // logs go to stderr so command output stays pipeable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("Failed to load config from {}", path))?,
        None => RelayConfig::default(),
    };
    debug!(?config, "configuration loaded");

    match commands::run(args.command, &config, args.auth.as_deref()).await {
        Err(e) if e.downcast_ref::<RelayError>().is_some_and(RelayError::is_auth) => {
            Err(e.context("Credential rejected; pass --auth or set RELAY_AUTH"))
        }
        other => other,
    }
}
