//! redact-migrate CLI
//!
//! Runs one migration described by a YAML configuration file.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use redact_migrate::{MigrationConfig, Pipeline};

#[derive(Parser)]
#[command(name = "redact-migrate")]
#[command(version)]
#[command(
    about = "Migrate a table or collection between databases, deleting and anonymising fields",
    long_about = None
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Application has started");
    info!("Loading configuration from {:?}", cli.config);

    let config = MigrationConfig::from_file(&cli.config)?;
    let mut pipeline = Pipeline::new(config)?;
    let stats = pipeline.run().await?;

    println!("\nMigration complete");
    println!("   Read:       {}", stats.records_read);
    println!("   Written:    {}", stats.records_written);
    println!("   Deleted:    {} field values", stats.fields_deleted);
    println!("   Anonymised: {} field values", stats.fields_anonymised);
    println!("   Duration:   {:.2}s", stats.duration_secs);
    println!("   Throughput: {:.0} records/sec", stats.throughput());

    Ok(())
}
