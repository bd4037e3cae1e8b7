use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use rna_classifier::build_snapshot;
use rna_classifier::config::Config;
use rna_classifier::telemetry::init_logging;

/// Embed reference records and write a compressed index snapshot
#[derive(Debug, Parser)]
#[command(name = "build_reference_index", version)]
pub struct Args {
    #[arg(
        value_name = "RECORDS",
        help = "JSON array or .jsonl reference records [default: configured reference_path]"
    )]
    pub records: Option<PathBuf>,

    #[arg(
        value_name = "OUTPUT",
        help = "Snapshot file to write [default: configured snapshot_path]"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        help = "YAML configuration file (falls back to RNA_CONFIG_FILE)"
    )]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let _guard = init_logging(&config.logging)?;

    let Some(records) = args.records.or_else(|| config.reference_path.clone()) else {
        bail!("no reference records given and reference_path is not configured");
    };
    let Some(output) = args.output.or_else(|| config.snapshot_path.clone()) else {
        bail!("no output given and snapshot_path is not configured");
    };
    if !records.exists() {
        bail!("Reference records not found at {:?}", records);
    }

    // Embedding every record is CPU-bound
    let out = output.clone();
    let stats = tokio::task::spawn_blocking(move || build_snapshot(&config, &records, &out))
        .await
        .context("Index build task panicked")?
        .with_context(|| format!("Failed to build snapshot {:?}", output))?;

    for (family, count) in &stats.families {
        println!("{:<12} {}", family, count);
    }
    Ok(())
}
