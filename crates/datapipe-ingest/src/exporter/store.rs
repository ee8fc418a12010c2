//! Storage backend seam for [`TableExporter`](super::TableExporter)

use super::ExportError;
use async_trait::async_trait;
use datapipe_common::table::Table;

/// Name of the row-position column written ahead of the data columns
pub const INDEX_COLUMN: &str = "index";

/// The four operations an export needs from a database
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn schema_exists(&self, schema: &str) -> Result<bool, ExportError>;

    /// Create `schema` and make it visible to later calls
    async fn create_schema(&self, schema: &str) -> Result<(), ExportError>;

    /// Drop `schema.table` if present, recreate it from `table`'s columns and
    /// insert every row. Either all of this happens or none of it does.
    async fn replace_table(
        &self,
        schema: &str,
        name: &str,
        table: &Table,
        write_index: bool,
    ) -> Result<(), ExportError>;

    /// Rows currently in `schema.table`; [`ExportError::TableNotFound`] when
    /// it does not exist
    async fn row_count(&self, schema: &str, table: &str) -> Result<u64, ExportError>;
}

/// Reject tables whose columns would clash with the index column
pub fn check_index_column(table: &Table, write_index: bool) -> Result<(), ExportError> {
    if write_index && table.column_names().any(|c| c == INDEX_COLUMN) {
        return Err(ExportError::InvalidIdentifier(format!(
            "data column '{}' collides with the row index column; disable write_index",
            INDEX_COLUMN
        )));
    }
    Ok(())
}
