//! pipekit - Concurrent data pipelines from the command line
//!
//! # Usage
//!
//! ```bash
//! # Decorate every line of several files
//! pipekit lines input.txt input2.txt --output output.txt
//!
//! # Decode JSON records, one per line
//! pipekit json people.jsonl --strict
//!
//! # Fan names out to two coupled greeting pipelines
//! pipekit greet names.txt --output-dir out/
//!
//! # Reverse whatever a TCP client sends
//! pipekit reverse --port 5001 --timeout-secs 60
//! ```

mod cmd;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipekit_config::{Config, LogConfig};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// pipekit - Concurrent data pipelines from the command line
#[derive(Parser, Debug)]
#[command(name = "pipekit")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides `[log] filter` (e.g. debug, warn,pipekit_pipeline=trace)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decorate each line of one or more text files
    Lines(cmd::lines::LinesArgs),

    /// Decode JSON person records and describe each one
    Json(cmd::json::JsonArgs),

    /// Greet every name through coupled pipelines
    Greet(cmd::greet::GreetArgs),

    /// Echo reversed chunks back to a TCP client
    Reverse(cmd::reverse::ReverseArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.log, cli.log_level.as_deref())?;

    match cli.command {
        Command::Lines(args) => cmd::lines::run(args, &config).await,
        Command::Json(args) => cmd::json::run(args, &config).await,
        Command::Greet(args) => cmd::greet::run(args, &config).await,
        Command::Reverse(args) => cmd::reverse::run(args, &config).await,
    }
}

/// Load the config file if one was given, defaults otherwise
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(config: &LogConfig, level_override: Option<&str>) -> Result<()> {
    let directive = level_override.unwrap_or(&config.filter);
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| anyhow::anyhow!("invalid log filter '{}': {}", directive, e))?;

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(writer))
            .try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}
