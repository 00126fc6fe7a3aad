//! Mapping export ingestion tool
//!
//! Loads a CRM mapping export (CSV or Excel workbook with "Account Name" and
//! "Salesforce Account Name" columns) into the alias store.
//!
//! **Usage:**
//! ```bash
//! acmap-ingest [--config <FILE>] [--policy strict|merge] [--json] <FILE>
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use acmap_common::config::load_config;
use acmap_common::ingest::{read_mapping_file, Ingestor};
use acmap_common::{open_store, MappingResolver, ResolutionPolicy};
use acmap_svc::logging::init_tracing;

/// Mapping ingestion
#[derive(Parser, Debug)]
#[command(name = "acmap-ingest")]
#[command(about = "Load an account mapping export (CSV or Excel) into the alias store")]
struct Args {
    /// Path to TOML config file (overrides ACMAP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resolution policy, overriding `[policy] ingest`
    #[arg(long, value_name = "POLICY")]
    policy: Option<ResolutionPolicy>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Export to load (.csv, or .xlsx and other workbook formats)
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging.level);

    let policy = args.policy.unwrap_or(config.policy.ingest);
    info!(file = %args.file.display(), %policy, "Starting ingestion");

    let rows = read_mapping_file(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let store = open_store(&config.store)
        .await
        .context("Failed to open alias store")?;
    let ingestor = Ingestor::new(MappingResolver::new(store, policy));

    let report = ingestor.run(rows).await.context("Ingestion aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Created:   {}", report.created);
        println!("Updated:   {}", report.updated);
        println!("Unchanged: {}", report.unchanged);
        println!("Skipped:   {}", report.skipped);
        println!("Rejected:  {}", report.rejected);
        println!("Failed:    {}", report.failed);
        println!("Successfully applied {} records", report.applied());
    }
    Ok(())
}
