use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "slotroster",
    version,
    about = "Maps live schedule assignments onto numbered hardware slots",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (environment only when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the refresh scheduler until Ctrl-C
    Run {
        /// Do not log slot assignments when the active plan changes
        #[arg(long, default_value = "false")]
        quiet_slots: bool,
    },

    /// Refresh once and list upcoming plans
    Plans {
        /// Only plans of this group
        #[arg(short, long)]
        group: Option<String>,

        /// Print JSON instead of text
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Refresh once and print the active plan's slots
    Active {
        /// Select this plan manually when nothing is live
        #[arg(long)]
        plan: Option<String>,

        /// Print JSON instead of text
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List a group's teams and team positions
    Teams {
        /// Group (service type) id
        #[arg(short, long)]
        group: String,
    },

    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, cli.verbose)?;

    tracing::info!("slotroster starting");

    match cli.command {
        Commands::Run { quiet_slots } => {
            tracing::info!(quiet_slots, "Starting run command");
            commands::run(config, !quiet_slots).await?;
        }

        Commands::Plans { group, json } => {
            tracing::info!(group = ?group, "Starting plans command");
            commands::plans(config, group, json).await?;
        }

        Commands::Active { plan, json } => {
            tracing::info!(plan = ?plan, "Starting active command");
            commands::active(config, plan, json).await?;
        }

        Commands::Teams { group } => {
            tracing::info!(group = %group, "Starting teams command");
            commands::teams(config, group).await?;
        }

        Commands::CheckConfig => {
            commands::check_config(config).await?;
        }
    }

    tracing::info!("slotroster completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("slotroster=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("slotroster=info,warn"))
    };

    match format {
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
