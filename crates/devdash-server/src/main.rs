// crates/devdash-server/src/main.rs
// devdash - local project dashboard

mod cli;

use anyhow::{Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use devdash::DashboardService;
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then working directory)
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".devdash/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        match cli.command {
            Commands::Refresh => Level::INFO,
            _ => Level::WARN, // Quiet for read commands; stdout carries JSON
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (config, validation) = devdash::config::load();
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.is_valid() && !matches!(cli.command, Commands::Status) {
        bail!("Invalid configuration\n{}", validation.report());
    }

    let service = DashboardService::open(&config).await?;

    match cli.command {
        Commands::Refresh => cli::run_refresh(&service).await?,
        Commands::List => cli::run_list(&service).await?,
        Commands::Show { id } => cli::run_show(&service, &id).await?,
        Commands::Activity { id } => cli::run_activity(&service, &id).await?,
        Commands::Pin { id } => cli::run_pin(&service, &id).await?,
        Commands::Touch { id, tool } => cli::run_touch(&service, &id, tool.as_deref()).await?,
        Commands::Override { id, json } => cli::run_override(&service, &id, &json).await?,
        Commands::Metadata { id, json } => cli::run_metadata(&service, &id, &json).await?,
        Commands::Status => cli::run_status(&service, &config, &validation).await?,
    }

    Ok(())
}
