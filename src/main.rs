use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scopus_etl::analytics::summarize_collaboration;
use scopus_etl::extract::DumpDirectorySource;
use scopus_etl::helpers::run_timestamp;
use scopus_etl::pipeline::{BulkImportConfig, StageOutcome};
use scopus_etl::{Pipeline, PipelineConfig, PipelineState, StagingLayout};

#[derive(Parser)]
#[command(name = "scopus_etl")]
#[command(about = "Scopus bibliographic ETL for relational and graph stores")]
struct Cli {
    /// Root directory holding one staging directory per run
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// First publication year (inclusive)
    #[arg(short, long)]
    start_year: i32,

    /// Last publication year (inclusive)
    #[arg(short, long)]
    end_year: i32,

    /// Run identifier; reuse one to resume an earlier run (default: current timestamp)
    #[arg(short, long)]
    run_id: Option<String>,

    /// Directory of results_<year>.jsonl[.gz] dumps used to populate the raw stage
    #[arg(long)]
    raw_source: Option<PathBuf>,

    /// Also write typed Parquet copies of the cleaned tables
    #[arg(long)]
    parquet: bool,

    /// Path to neo4j-admin; enables the graph bulk import
    #[arg(long)]
    neo4j_admin: Option<PathBuf>,

    /// Path to cypher-shell; creates the graph indexes after the bulk import
    #[arg(long, requires = "neo4j_admin")]
    cypher_shell: Option<PathBuf>,

    /// Target graph database for the bulk import
    #[arg(long, default_value = "neo4j")]
    database: String,

    /// Summarise the collaboration graph after export
    #[arg(long)]
    analyze: bool,

    /// Minimum collaboration count considered by --analyze
    #[arg(long, default_value = "2")]
    min_weight: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    let run_id = args.run_id.unwrap_or_else(run_timestamp);
    let layout = StagingLayout::new(&args.data_dir, run_id, args.start_year, args.end_year)?;
    info!("Staging directory: {}", layout.run_dir().display());

    let mut config = PipelineConfig::new(layout);
    config.columnar = args.parquet;
    config.bulk_import = args.neo4j_admin.map(|admin_bin| BulkImportConfig {
        admin_bin,
        database: args.database.clone(),
        cypher_shell: args.cypher_shell.clone(),
    });

    let mut pipeline = Pipeline::new(config);
    if let Some(dir) = args.raw_source {
        pipeline = pipeline.with_source(Box::new(DumpDirectorySource::new(dir)));
    }

    let report = pipeline.run()?;
    for (stage, outcome) in &report.stages {
        match outcome {
            StageOutcome::Ran => info!("  {}: ran", stage),
            StageOutcome::Skipped => info!("  {}: skipped (already populated)", stage),
            StageOutcome::NotConfigured => info!("  {}: not configured", stage),
        }
    }
    if let Some(filter) = report.filter {
        info!(
            "Referential filter removed {} of {} authorships ({:.2}%)",
            filter.removed, filter.before, filter.removed_percentage
        );
    }

    if pipeline.state() != PipelineState::Done {
        warn!("Run stopped in state {:?}; supply --raw-source to extract", pipeline.state());
        return Ok(());
    }

    if args.analyze {
        let results = summarize_collaboration(&pipeline.layout().graph_dir(), args.min_weight)
            .context("Collaboration analysis failed")?;
        for (name, metrics) in results {
            info!("{}: {}", name, serde_json::to_string(&metrics)?);
        }
    }

    info!("Run complete: {}", pipeline.layout().run_dir().display());
    Ok(())
}
