//! Kiln CLI - argument parsing, logging setup, command dispatch.

mod commands;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kiln_engine::config::{self, KilnConfig, ResolvedConfig};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Combine elements once, remember the result forever")]
struct Cli {
    /// Database file (overrides `[store] path`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Config file (default: ~/.kiln/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine two elements, in either order
    Combine { first: String, second: String },
    /// Combine random pairs of known elements
    Explore {
        /// Stop after this many generator calls (default: until exhausted)
        #[arg(long)]
        rounds: Option<u64>,
    },
    /// Import elements from a game save file
    Import { file: PathBuf },
    /// Export every element as a game save file
    Export { file: PathBuf },
    /// Insert the four starting elements
    Seed,
    /// Show store statistics
    Stats,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::debug!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();
    let Some(candidate) = config::kiln_dir().map(|dir| dir.join("logs").join("kiln.log")) else {
        return (None, warnings);
    };

    if let Some(parent) = candidate.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warnings.push(format!(
            "Failed to create log dir {}: {e}",
            parent.display()
        ));
        return (None, warnings);
    }

    match OpenOptions::new().create(true).append(true).open(&candidate) {
        Ok(file) => (Some((candidate, file)), warnings),
        Err(e) => {
            warnings.push(format!(
                "Failed to open log file {}: {e}",
                candidate.display()
            ));
            (None, warnings)
        }
    }
}

fn load_config(cli: &Cli) -> Result<ResolvedConfig> {
    let file = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            KilnConfig::load_from(path)?
        }
        None => KilnConfig::load()?,
    };

    let mut resolved = ResolvedConfig::from_config(file.as_ref())?;
    if let Some(db) = &cli.db {
        resolved.db_path.clone_from(db);
    }
    Ok(resolved)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli)?;
    commands::run(cli.command, &config).await
}
