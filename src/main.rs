use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use svitlo::config::{Config, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "svitlo",
    version,
    about = "Power outage schedule tracker for regional utilities",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults plus SVITLO_* variables when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List known regions
    Regions,

    /// Update one region, or every active region
    Update {
        /// Region code
        #[arg(short, long)]
        region: Option<String>,
    },

    /// Show stored schedules of a region, or of one of its groups
    Show {
        /// Region code
        #[arg(short, long)]
        region: String,

        /// Group code (e.g. 3.2); every stored group when omitted
        #[arg(short, long)]
        group: Option<String>,

        /// Date (YYYY-MM-DD); today when omitted
        #[arg(short, long)]
        date: Option<chrono::NaiveDate>,
    },

    /// Decode a saved artifact with a region's decoder, without storing it
    Decode {
        /// Region code
        #[arg(short, long)]
        region: String,

        /// Image or HTML file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Update all active regions periodically until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // Initialize tracing/logging
    setup_tracing(&config.logging, cli.log_format.as_deref(), cli.verbose)?;

    tracing::info!(config = ?cli.config, "svitlo starting");

    match cli.command {
        Commands::Regions => commands::regions(&config)?,
        Commands::Update { region } => {
            tracing::info!(region = ?region, "Starting update command");
            commands::update(&config, region.as_deref()).await?;
        }
        Commands::Show {
            region,
            group,
            date,
        } => commands::show(&config, &region, group.as_deref(), date)?,
        Commands::Decode { region, file } => {
            tracing::info!(region = %region, file = %file.display(), "Starting decode command");
            commands::decode(&config, &region, &file).await?;
        }
        Commands::Run => commands::run(&config).await?,
    }

    Ok(())
}

fn setup_tracing(logging: &LoggingConfig, format: Option<&str>, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("svitlo=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("svitlo={},warn", logging.level))?
    };

    match format.unwrap_or(logging.format.as_str()) {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
