//! datapipe ingest library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads CSV files from public Kaggle datasets into PostgreSQL tables.
//!
//! - [`fetcher`]: authenticated download into a staging directory and CSV parsing
//! - [`exporter`]: replace-semantics table writes with a row count check
//! - [`pipeline`]: fetch every configured dataset, then export each one
//!
//! # Example
//!
//! ```no_run
//! use datapipe_ingest::config::AppConfig;
//! use datapipe_ingest::exporter::TableExporter;
//! use datapipe_ingest::fetcher::DatasetFetcher;
//! use datapipe_ingest::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let fetcher = DatasetFetcher::new(&config.kaggle, config.staging.clone())?;
//!     let exporter = TableExporter::connect(&config.database).await?;
//!
//!     let summary = Pipeline::new(fetcher, exporter, &config.database.schema)
//!         .run(&config.datasets)
//!         .await?;
//!     tracing::info!(tables = summary.exports.len(), "done");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod exporter;
pub mod fetcher;
pub mod pipeline;

pub use dataset::{DatasetRef, DatasetSpec};
pub use pipeline::{MismatchPolicy, Pipeline, PipelineError, RunSummary};
