use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use rna_classifier::config::Config;
use rna_classifier::telemetry::init_logging;
use rna_classifier::RnaClassifier;

/// Classify one RNA molecule against the configured reference index
#[derive(Debug, Parser)]
#[command(name = "rna_classify", version)]
pub struct Args {
    #[arg(value_name = "SEQUENCE", help = "RNA sequence over A, U, G, C")]
    pub sequence: String,

    #[arg(value_name = "STRUCTURE", help = "Dot-bracket structure of the same length")]
    pub structure: String,

    #[arg(value_name = "K", help = "Number of neighbors [default: configured default_top_k]")]
    pub k: Option<usize>,

    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        help = "YAML configuration file (falls back to RNA_CONFIG_FILE)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long = "validate-only",
        help = "Report validation results without querying the index"
    )]
    pub validate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let _guard = init_logging(&config.logging)?;

    let classifier = Arc::new(RnaClassifier::from_config(config).context("Failed to build classifier")?);

    if args.validate_only {
        let report = classifier.validate_request(&args.sequence, &args.structure);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let stats = classifier.index_stats();
    info!(
        "Reference index ready: {} entries across {} families",
        stats.total_entries,
        stats.families.len()
    );

    match classifier
        .classify_request_async(args.sequence, args.structure, args.k)
        .await
    {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e)?);
            bail!("{} ({})", e, e.code())
        }
    }
}
