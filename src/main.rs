//! CLI entry point for explore_daq
//!
//! Provides command-line interface for:
//! - Running a simulated explore or fixed-area session
//! - Validating a configuration file
//!
//! # Usage
//!
//! ```bash
//! explore_daq simulate --config config/explore.toml
//! explore_daq check-config --config config/explore.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use explore_daq::config::{SimulatorConfig, DEFAULT_CONFIG_PATH};
use explore_daq::logging;
use explore_daq::simulate::Simulation;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "explore_daq")]
#[command(about = "Explore-mode acquisition scheduler with simulated hardware", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured session against mock devices
    Simulate {
        /// Print the session report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SimulatorConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Simulate { json } => simulate(config, json).await,
        Commands::CheckConfig => {
            config.validate()?;
            println!("{} is valid", cli.config.display());
            Ok(())
        }
    }
}

async fn simulate(config: SimulatorConfig, json: bool) -> Result<()> {
    logging::init_from_config(&config)?;
    info!(application = %config.application.name, "Starting simulated session");

    let simulation = Simulation::new(config)?;
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; aborting acquisition");
                shutdown.cancel();
            }
        });
    }

    let report = simulation.run(shutdown).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Acquisition '{}' ({}): {}", report.name, report.mode, report.state);
        println!("  images:    {} ({} failed)", report.images, report.failures);
        println!("  positions: {}", report.positions);
        println!("  slices:    {}..={}", report.min_slice, report.max_slice);
    }
    Ok(())
}
