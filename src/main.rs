use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epg_reconciler::{config::Config, constants, database::Database, orchestrator};

#[derive(Parser)]
#[command(name = "epg-reconciler")]
#[command(version)]
#[command(about = "Merges a live sports XMLTV feed into lineup EPGs and emits reconciled XMLTV")]
struct Cli {
    /// Backup XMLTV files generated by the previous run before overwriting
    #[arg(short = 'b', long = "backup")]
    backup: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", default_value = constants::DEFAULT_CONFIGURATION_FILE_PATH)]
    config: PathBuf,

    /// Match store file path
    #[arg(short = 'd', long = "database", default_value = constants::DEFAULT_DB_FILE_PATH)]
    database: PathBuf,

    /// Log file path
    #[arg(short = 'l', long = "log-file", default_value = constants::DEFAULT_LOG_FILE_PATH)]
    log_file: PathBuf,

    /// Output directory path
    #[arg(short = 'o', long = "output", default_value = constants::DEFAULT_OUTPUT_XMLTV_DIRECTORY_PATH)]
    output: PathBuf,
}

fn initialize_logging(cli: &Cli, config: &Config) -> Result<()> {
    let default_filter = format!(
        "epg_reconciler={}",
        match config.logging_level.to_uppercase().as_str() {
            "DEBUG" => "debug",
            "ERROR" => "error",
            _ => "info",
        }
    );
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if let Some(parent) = cli.log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = Arc::new(
        File::options()
            .create(true)
            .append(true)
            .open(&cli.log_file)
            .with_context(|| format!("cannot open log file {}", cli.log_file.display()))?,
    );

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(log_file),
        )
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("cannot load configuration from {}", cli.config.display()))?;
    initialize_logging(&cli, &config)?;

    info!(
        "Starting EPG reconciler v{}\nConfiguration file path => {}\nDatabase file path      => {}\nLog file path           => {}\nOutput directory path   => {}",
        env!("CARGO_PKG_VERSION"),
        cli.config.display(),
        cli.database.display(),
        cli.log_file.display(),
        cli.output.display(),
    );

    if let Some(parent) = cli.database.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(&cli.database, &config.paths.create_schema)
        .await
        .context("cannot open the match store")?;

    let report = orchestrator::run(&config, db.clone(), &cli.output, cli.backup).await?;
    db.close().await;

    if !report.errors.is_empty() {
        error!(
            "Run completed with {} errors:\n{}",
            report.errors.len(),
            report.errors.join("\n------------------------------------------------------------\n")
        );
        if config.gmail.as_ref().is_some_and(|gmail| gmail.enabled) {
            // Delivery itself is handled by the deployment's mailer; the
            // aggregated error text above is what it forwards.
            info!("Error notification requested via gmail configuration");
        }
    }

    info!("Shutdown EPG reconciler v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
