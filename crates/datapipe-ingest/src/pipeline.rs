//! Fetch-then-export orchestration

use crate::dataset::DatasetSpec;
use crate::exporter::{ExportError, ExportReport, TableExporter, TableStore};
use crate::fetcher::{DatasetFetcher, FetchError, FetchReport, FetchedTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// What a post-write row count mismatch does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Abort the run with [`ExportError::VerificationMismatch`]
    #[default]
    Fail,
    /// Log it, record it in the summary and continue
    Warn,
}

impl FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" | "error" => Ok(MismatchPolicy::Fail),
            "warn" | "warning" => Ok(MismatchPolicy::Warn),
            other => Err(format!("unknown mismatch policy '{}', expected 'fail' or 'warn'", other)),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Fetching {dataset} failed: {source}")]
    Fetch {
        dataset: String,
        #[source]
        source: FetchError,
    },

    #[error("Exporting {schema}.{table} failed: {source}")]
    Export {
        schema: String,
        table: String,
        #[source]
        source: ExportError,
    },
}

impl PipelineError {
    pub fn is_verification_mismatch(&self) -> bool {
        matches!(
            self,
            PipelineError::Export {
                source: ExportError::VerificationMismatch { .. },
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetches: Vec<FetchReport>,
    pub exports: Vec<ExportReport>,
}

impl RunSummary {
    pub fn mismatches(&self) -> impl Iterator<Item = &ExportReport> {
        self.exports.iter().filter(|r| !r.is_verified())
    }

    pub fn all_verified(&self) -> bool {
        self.mismatches().next().is_none()
    }
}

pub struct Pipeline<S> {
    fetcher: DatasetFetcher,
    exporter: TableExporter<S>,
    schema: String,
    on_mismatch: MismatchPolicy,
}

impl<S: TableStore> Pipeline<S> {
    pub fn new(fetcher: DatasetFetcher, exporter: TableExporter<S>, schema: impl Into<String>) -> Self {
        Self {
            fetcher,
            exporter,
            schema: schema.into(),
            on_mismatch: MismatchPolicy::Fail,
        }
    }

    pub fn on_mismatch(mut self, policy: MismatchPolicy) -> Self {
        self.on_mismatch = policy;
        self
    }

    pub fn exporter(&self) -> &TableExporter<S> {
        &self.exporter
    }

    /// Fetch every dataset in order, then export each one in order.
    ///
    /// Any fetch or export error stops the run. A row count mismatch stops it
    /// too under [`MismatchPolicy::Fail`].
    pub async fn run(&self, datasets: &[DatasetSpec]) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        info!(datasets = datasets.len(), schema = %self.schema, "Starting ingestion run");

        let mut fetched: Vec<(String, FetchedTable)> = Vec::with_capacity(datasets.len());
        for spec in datasets {
            let result = self
                .fetcher
                .get_as_table(&spec.dataset, &spec.file)
                .await
                .map_err(|source| PipelineError::Fetch {
                    dataset: spec.to_string(),
                    source,
                })?;
            fetched.push((spec.table_name(), result));
        }

        let mut fetches = Vec::with_capacity(fetched.len());
        let mut exports = Vec::with_capacity(fetched.len());

        for (table_name, FetchedTable { table, report }) in fetched {
            fetches.push(report);

            let export_error = |source| PipelineError::Export {
                schema: self.schema.clone(),
                table: table_name.clone(),
                source,
            };

            let export = self
                .exporter
                .export_table(table, &table_name, &self.schema)
                .await
                .map_err(export_error)?;

            if !export.is_verified() {
                match self.on_mismatch {
                    MismatchPolicy::Fail => {
                        export.ensure_verified().map_err(export_error)?;
                    },
                    MismatchPolicy::Warn => {
                        warn!(
                            schema = %export.schema,
                            table = %export.table,
                            expected = export.rows_expected,
                            found = export.rows_found,
                            "Continuing past row count mismatch"
                        );
                    },
                }
            }

            exports.push(export);
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            fetches,
            exports,
        };

        info!(
            tables = summary.exports.len(),
            verified = summary.all_verified(),
            "Ingestion run finished"
        );

        Ok(summary)
    }
}
