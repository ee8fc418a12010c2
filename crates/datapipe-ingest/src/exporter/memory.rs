//! In-process table store
//!
//! Backs `--dry-run`: the full ensure-schema, replace and verify sequence runs
//! against a map instead of a database, so parsing and counts can be checked
//! without PostgreSQL.

use super::store::{check_index_column, TableStore};
use super::ExportError;
use async_trait::async_trait;
use datapipe_common::table::Table;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    schemas: BTreeSet<String>,
    tables: BTreeMap<(String, String), Table>,
    schema_creations: usize,
}

#[derive(Debug, Default)]
pub struct MemoryTableStore {
    state: Mutex<State>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, ExportError> {
        self.state
            .lock()
            .map_err(|_| ExportError::Store("memory store lock poisoned".to_string()))
    }

    /// How many times a schema has been created
    pub fn schema_creations(&self) -> usize {
        self.lock().map(|s| s.schema_creations).unwrap_or(0)
    }

    /// Copy of the stored table, if any
    pub fn table(&self, schema: &str, name: &str) -> Option<Table> {
        self.lock()
            .ok()
            .and_then(|s| s.tables.get(&(schema.to_string(), name.to_string())).cloned())
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn schema_exists(&self, schema: &str) -> Result<bool, ExportError> {
        Ok(self.lock()?.schemas.contains(schema))
    }

    async fn create_schema(&self, schema: &str) -> Result<(), ExportError> {
        let mut state = self.lock()?;
        if state.schemas.insert(schema.to_string()) {
            state.schema_creations += 1;
        }
        Ok(())
    }

    async fn replace_table(
        &self,
        schema: &str,
        name: &str,
        table: &Table,
        write_index: bool,
    ) -> Result<(), ExportError> {
        check_index_column(table, write_index)?;

        let mut state = self.lock()?;
        if !state.schemas.contains(schema) {
            return Err(ExportError::Store(format!("schema '{}' does not exist", schema)));
        }
        state
            .tables
            .insert((schema.to_string(), name.to_string()), table.clone());
        Ok(())
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<u64, ExportError> {
        self.lock()?
            .tables
            .get(&(schema.to_string(), table.to_string()))
            .map(|t| t.row_count() as u64)
            .ok_or_else(|| ExportError::TableNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            })
    }
}
