//! Table export with post-write verification
//!
//! [`TableExporter`] writes a [`Table`] into `schema.table` with replace
//! semantics and then reads the row count back. A disagreement is returned to
//! the caller in the [`ExportReport`] rather than swallowed.
//!
//! The database side sits behind [`TableStore`]; [`PgTableStore`] talks to
//! PostgreSQL and [`MemoryTableStore`] keeps tables in process.

pub mod identifier;
mod memory;
mod postgres;
mod store;

pub use memory::MemoryTableStore;
pub use postgres::PgTableStore;
pub use store::{TableStore, INDEX_COLUMN};

use crate::config::DatabaseConfig;
use datapipe_common::table::Table;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Database connection failed: {0}. Check DATABASE_URL or the PG_* settings.")]
    Connection(#[source] sqlx::Error),

    #[error("Query failed ({statement}): {source}")]
    Query {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Table {schema}.{table} does not exist")]
    TableNotFound { schema: String, table: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Table store error: {0}")]
    Store(String),

    #[error("Row count mismatch for {schema}.{table}: wrote {expected} rows, found {found}")]
    VerificationMismatch {
        schema: String,
        table: String,
        expected: u64,
        found: u64,
    },
}

impl ExportError {
    /// True for failures of a statement against an existing connection,
    /// including a missing table
    pub fn is_query_error(&self) -> bool {
        matches!(self, ExportError::Query { .. } | ExportError::TableNotFound { .. })
    }
}

/// Outcome of one [`TableExporter::export_table`] call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub schema: String,
    pub table: String,

    /// Rows in the table handed to the exporter
    pub rows_expected: u64,

    /// Rows read back from the destination after the write
    pub rows_found: u64,

    pub schema_created: bool,
}

impl ExportReport {
    pub fn is_verified(&self) -> bool {
        self.rows_expected == self.rows_found
    }

    pub fn ensure_verified(&self) -> Result<(), ExportError> {
        if self.is_verified() {
            Ok(())
        } else {
            Err(ExportError::VerificationMismatch {
                schema: self.schema.clone(),
                table: self.table.clone(),
                expected: self.rows_expected,
                found: self.rows_found,
            })
        }
    }
}

pub struct TableExporter<S> {
    store: S,
    write_index: bool,
}

impl TableExporter<PgTableStore> {
    /// Connect to the database named by `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ExportError> {
        Ok(Self::new(PgTableStore::connect(config).await?))
    }
}

impl<S: TableStore> TableExporter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_index: true,
        }
    }

    /// Whether to write the 0-based row position as a leading `index` column
    pub fn with_index(mut self, write_index: bool) -> Self {
        self.write_index = write_index;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create `schema` if it does not exist. Returns whether it was created.
    pub async fn ensure_schema(&self, schema: &str) -> Result<bool, ExportError> {
        info!(schema, "Checking schema");
        if self.store.schema_exists(schema).await? {
            return Ok(false);
        }
        info!(schema, "Schema does not exist, creating");
        self.store.create_schema(schema).await?;
        Ok(true)
    }

    pub async fn row_count(&self, table: &str, schema: &str) -> Result<u64, ExportError> {
        let count = self.store.row_count(schema, table).await?;
        info!(schema, table, rows = count, "Row count");
        Ok(count)
    }

    /// Write `table` to `schema.table_name`, replacing whatever was there, and
    /// verify the destination row count.
    ///
    /// A count mismatch is not an `Err`; check [`ExportReport::is_verified`]
    /// or call [`ExportReport::ensure_verified`].
    #[instrument(skip(self, table), fields(rows = table.row_count()))]
    pub async fn export_table(
        &self,
        table: Table,
        table_name: &str,
        schema: &str,
    ) -> Result<ExportReport, ExportError> {
        let schema_created = self.ensure_schema(schema).await?;

        info!(schema, table = table_name, "Exporting");
        self.store
            .replace_table(schema, table_name, &table, self.write_index)
            .await?;

        let rows_expected = table.row_count() as u64;
        drop(table);

        let rows_found = self.row_count(table_name, schema).await?;

        let report = ExportReport {
            schema: schema.to_string(),
            table: table_name.to_string(),
            rows_expected,
            rows_found,
            schema_created,
        };

        if report.is_verified() {
            info!(schema, table = table_name, rows = rows_found, "Export verified");
        } else {
            error!(
                schema,
                table = table_name,
                expected = rows_expected,
                found = rows_found,
                "Not all rows exported"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use datapipe_common::table::{Column, ColumnType, Value};

    fn table(rows: i64) -> Table {
        Table::new(
            vec![Column::new("n", ColumnType::BigInt)],
            (0..rows).map(|i| vec![Value::Int(i)]).collect(),
        )
        .unwrap()
    }

    /// Stores one row fewer than it is given
    #[derive(Default)]
    struct LossyStore {
        inner: MemoryTableStore,
    }

    #[async_trait]
    impl TableStore for LossyStore {
        async fn schema_exists(&self, schema: &str) -> Result<bool, ExportError> {
            self.inner.schema_exists(schema).await
        }

        async fn create_schema(&self, schema: &str) -> Result<(), ExportError> {
            self.inner.create_schema(schema).await
        }

        async fn replace_table(
            &self,
            schema: &str,
            name: &str,
            table: &Table,
            write_index: bool,
        ) -> Result<(), ExportError> {
            let kept = table.rows().iter().skip(1).cloned().collect();
            let truncated = Table::new(table.columns().to_vec(), kept).unwrap();
            self.inner.replace_table(schema, name, &truncated, write_index).await
        }

        async fn row_count(&self, schema: &str, table: &str) -> Result<u64, ExportError> {
            self.inner.row_count(schema, table).await
        }
    }

    #[tokio::test]
    async fn test_ensure_schema_creates_once() {
        let exporter = TableExporter::new(MemoryTableStore::new());

        assert!(exporter.ensure_schema("data_demo").await.unwrap());
        assert!(!exporter.ensure_schema("data_demo").await.unwrap());
        assert_eq!(exporter.store().schema_creations(), 1);
    }

    #[tokio::test]
    async fn test_export_then_count() {
        let exporter = TableExporter::new(MemoryTableStore::new());

        for rows in [0, 1, 250] {
            let report = exporter.export_table(table(rows), "t", "s").await.unwrap();
            assert!(report.is_verified());
            assert_eq!(exporter.row_count("t", "s").await.unwrap(), rows as u64);
        }
    }

    #[tokio::test]
    async fn test_second_export_replaces_first() {
        let exporter = TableExporter::new(MemoryTableStore::new());

        exporter.export_table(table(5), "t", "s").await.unwrap();
        exporter.export_table(table(2), "t", "s").await.unwrap();

        let stored = exporter.store().table("s", "t").unwrap();
        assert_eq!(stored, table(2));
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let exporter = TableExporter::new(MemoryTableStore::new());
        let err = exporter.row_count("absent", "s").await.unwrap_err();
        assert!(err.is_query_error());
        assert!(matches!(err, ExportError::TableNotFound { .. }));
    }

    #[tokio::test]
    async fn test_lossy_store_surfaces_mismatch() {
        let exporter = TableExporter::new(LossyStore::default());

        let report = exporter.export_table(table(10), "t", "s").await.unwrap();
        assert!(!report.is_verified());
        assert_eq!(report.rows_expected, 10);
        assert_eq!(report.rows_found, 9);

        match report.ensure_verified() {
            Err(ExportError::VerificationMismatch { expected, found, .. }) => {
                assert_eq!((expected, found), (10, 9));
            },
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_index_column_collision() {
        let exporter = TableExporter::new(MemoryTableStore::new());
        let t = Table::new(vec![Column::new("index", ColumnType::BigInt)], vec![]).unwrap();
        assert!(matches!(
            exporter.export_table(t.clone(), "t", "s").await,
            Err(ExportError::InvalidIdentifier(_))
        ));

        let exporter = exporter.with_index(false);
        assert!(exporter.export_table(t, "t", "s").await.is_ok());
    }
}
