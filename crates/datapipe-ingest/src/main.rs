//! datapipe ingest - load Kaggle CSV datasets into PostgreSQL

use anyhow::{Context, Result};
use clap::Parser;
use datapipe_common::logging::{init_logging, LogConfig, LogLevel};
use datapipe_ingest::config::{parse_dataset_list, AppConfig};
use datapipe_ingest::exporter::{MemoryTableStore, PgTableStore, TableExporter, TableStore};
use datapipe_ingest::fetcher::DatasetFetcher;
use datapipe_ingest::pipeline::{MismatchPolicy, Pipeline};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "datapipe-ingest")]
#[command(author, version, about = "Load Kaggle CSV datasets into PostgreSQL")]
struct Cli {
    /// Target schema
    #[arg(long, env = "PG_SCHEMA")]
    schema: Option<String>,

    /// Directory downloads are staged in
    #[arg(long, env = "INGEST_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Dataset to load as owner/name:file[=table]; repeatable
    #[arg(short, long = "dataset")]
    datasets: Vec<String>,

    /// What a row count mismatch does: fail or warn
    #[arg(long, env = "INGEST_ON_MISMATCH")]
    on_mismatch: Option<MismatchPolicy>,

    /// Keep downloaded files after parsing
    #[arg(long)]
    keep_staging: bool,

    /// Do not write the leading index column
    #[arg(long)]
    no_index: bool,

    /// Parse and verify against an in-memory store instead of PostgreSQL
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(schema) = &self.schema {
            config.database.schema = schema.clone();
        }
        if let Some(dir) = &self.staging_dir {
            config.staging.dir = dir.clone();
        }
        if !self.datasets.is_empty() {
            config.datasets = parse_dataset_list(&self.datasets.join(","))?;
        }
        if let Some(policy) = self.on_mismatch {
            config.export.on_mismatch = policy;
        }
        if self.keep_staging {
            config.staging.keep_files = true;
        }
        if self.no_index {
            config.export.write_index = false;
        }
        config.validate()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::default()
        .level(log_level)
        .log_file_prefix("datapipe-ingest")
        .filter_directives("sqlx=warn")
        .with_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    cli.apply(&mut config)?;

    info!(
        datasets = config.datasets.len(),
        schema = %config.database.schema,
        staging = %config.staging.dir.display(),
        dry_run = cli.dry_run,
        "Starting datapipe ingest"
    );

    let fetcher = DatasetFetcher::new(&config.kaggle, config.staging.clone())?;

    let summary = if cli.dry_run {
        warn!("Dry run: tables are kept in memory and nothing is written to PostgreSQL");
        let pipeline = pipeline(fetcher, TableExporter::new(MemoryTableStore::new()), &config);
        pipeline.run(&config.datasets).await?
    } else {
        let store = PgTableStore::connect(&config.database).await?;
        let pipeline = pipeline(fetcher, TableExporter::new(store), &config);
        let result = pipeline.run(&config.datasets).await;
        pipeline.exporter().store().close().await;
        result?
    };

    for fetch in &summary.fetches {
        info!(
            dataset = %fetch.dataset,
            file = %fetch.file,
            bytes = fetch.bytes,
            sha256 = %fetch.sha256,
            rows = fetch.parsed_rows,
            "Fetched"
        );
    }
    for export in summary.mismatches() {
        warn!(
            schema = %export.schema,
            table = %export.table,
            expected = export.rows_expected,
            found = export.rows_found,
            "Not all rows exported"
        );
    }

    info!(
        tables = summary.exports.len(),
        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        "Ingestion complete"
    );
    Ok(())
}

fn pipeline<S: TableStore>(
    fetcher: DatasetFetcher,
    exporter: TableExporter<S>,
    config: &AppConfig,
) -> Pipeline<S> {
    let exporter = exporter.with_index(config.export.write_index);
    Pipeline::new(fetcher, exporter, config.database.schema.clone())
        .on_mismatch(config.export.on_mismatch)
}
