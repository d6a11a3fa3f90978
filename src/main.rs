//! CLI entry point for chantrig.
//!
//! Provides:
//! - `simulate`: run the synthetic firmware against the reference extension
//! - `layout`: print the ring layout the configuration resolves to
//!
//! # Usage
//!
//! ```bash
//! chantrig simulate --duration 5s --log-format compact
//! chantrig layout --config config/chantrig.toml --format toml
//! ```

use anyhow::{Context, Result};
use chantrig::config::ChanTrigConfig;
use chantrig::firmware::FirmwareBudget;
use chantrig::layout::BufferLayout;
use chantrig::logging::{self, OutputFormat, TracingConfig};
use chantrig::sim;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "chantrig")]
#[command(about = "Channel trigger sample exchange", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutFormat {
    Json,
    Toml,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the synthetic firmware and the reference extension
    Simulate {
        /// Configuration file
        #[arg(long, default_value = "config/chantrig.toml")]
        config: PathBuf,

        /// Override the simulated duration (e.g. 500ms, 5s)
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        duration: Option<Duration>,

        /// Log output format
        #[arg(long, value_enum, default_value = "pretty")]
        log_format: OutputFormat,
    },

    /// Print the resolved buffer layout
    Layout {
        /// Configuration file
        #[arg(long, default_value = "config/chantrig.toml")]
        config: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: LayoutFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            duration,
            log_format,
        } => simulate(config, duration, log_format).await,
        Commands::Layout { config, format } => print_layout(config, format),
    }
}

fn load(path: &Path) -> Result<ChanTrigConfig> {
    ChanTrigConfig::load_from(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

async fn simulate(path: PathBuf, duration: Option<Duration>, format: OutputFormat) -> Result<()> {
    let mut config = load(&path)?;
    if let Some(duration) = duration {
        config.simulation.duration = duration;
    }
    logging::init(TracingConfig::from_config(&config)?.with_format(format))?;

    let report = sim::run(&config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_layout(path: PathBuf, format: LayoutFormat) -> Result<()> {
    let config = load(&path)?;
    let granted = FirmwareBudget::new(config.firmware).grant(config.request.as_ref(), &config.extension);
    let layout = BufferLayout::resolve(&granted, &config.extension)
        .context("configuration does not resolve to a valid layout")?;

    let rendered = match format {
        LayoutFormat::Json => serde_json::to_string_pretty(&layout)?,
        LayoutFormat::Toml => toml::to_string_pretty(&layout)?,
    };
    println!("{rendered}");
    Ok(())
}
