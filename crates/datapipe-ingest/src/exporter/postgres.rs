//! PostgreSQL table store

use super::identifier::{qualified_name, quote_identifier};
use super::store::{check_index_column, TableStore, INDEX_COLUMN};
use super::ExportError;
use crate::config::DatabaseConfig;
use async_trait::async_trait;
use datapipe_common::table::{ColumnType, Table, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

/// Bind parameters allowed in one statement by the wire protocol
const MAX_BIND_PARAMS: usize = 65_535;

/// SQLSTATE for "relation does not exist"
const UNDEFINED_TABLE: &str = "42P01";

pub struct PgTableStore {
    pool: PgPool,
}

impl PgTableStore {
    /// Open the single connection the exporter uses for its lifetime
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ExportError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(ExportError::Connection)?;

        info!(url = %config.redacted_url(), "Connected to database");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn column_definitions(table: &Table, write_index: bool) -> Result<String, ExportError> {
    let mut defs = Vec::with_capacity(table.columns().len() + 1);
    if write_index {
        defs.push(format!("{} BIGINT", quote_identifier(INDEX_COLUMN)?));
    }
    for column in table.columns() {
        defs.push(format!(
            "{} {}",
            quote_identifier(&column.name)?,
            column.column_type.sql_name()
        ));
    }
    Ok(defs.join(", "))
}

fn column_list(table: &Table, write_index: bool) -> Result<String, ExportError> {
    let mut names = Vec::with_capacity(table.columns().len() + 1);
    if write_index {
        names.push(quote_identifier(INDEX_COLUMN)?);
    }
    for column in table.columns() {
        names.push(quote_identifier(&column.name)?);
    }
    Ok(names.join(", "))
}

fn push_value<'args>(
    b: &mut Separated<'_, 'args, Postgres, &'static str>,
    value: &'args Value,
    column_type: ColumnType,
) {
    match (value, column_type) {
        (Value::Null, ColumnType::Boolean) => b.push_bind(None::<bool>),
        (Value::Null, ColumnType::BigInt) => b.push_bind(None::<i64>),
        (Value::Null, ColumnType::Double) => b.push_bind(None::<f64>),
        (Value::Null, ColumnType::Text) => b.push_bind(None::<String>),
        (Value::Bool(v), _) => b.push_bind(*v),
        (Value::Int(v), _) => b.push_bind(*v),
        (Value::Float(v), _) => b.push_bind(*v),
        (Value::Text(v), _) => b.push_bind(v.as_str()),
    };
}

fn query_error(statement: &str, source: sqlx::Error) -> ExportError {
    ExportError::Query {
        statement: statement.to_string(),
        source,
    }
}

#[async_trait]
impl TableStore for PgTableStore {
    async fn schema_exists(&self, schema: &str) -> Result<bool, ExportError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)",
        )
        .bind(schema)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("schema lookup", e))
    }

    async fn create_schema(&self, schema: &str) -> Result<(), ExportError> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(schema)?);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error("CREATE SCHEMA", e))?;
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

        let target = qualified_name(schema, name)?;
        let columns = column_list(table, write_index)?;
        let types: Vec<ColumnType> = table.columns().iter().map(|c| c.column_type).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("BEGIN", e))?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", target))
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("DROP TABLE", e))?;

        sqlx::query(&format!(
            "CREATE TABLE {} ({})",
            target,
            column_definitions(table, write_index)?
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| query_error("CREATE TABLE", e))?;

        let binds_per_row = types.len() + usize::from(write_index);

        if binds_per_row == 0 {
            for _ in table.rows() {
                sqlx::query(&format!("INSERT INTO {} DEFAULT VALUES", target))
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| query_error("INSERT", e))?;
            }
        } else {
            let rows_per_chunk = (MAX_BIND_PARAMS / binds_per_row).max(1);

            for (chunk_idx, chunk) in table.rows().chunks(rows_per_chunk).enumerate() {
                let start = chunk_idx * rows_per_chunk;
                let mut query_builder: QueryBuilder<Postgres> =
                    QueryBuilder::new(format!("INSERT INTO {} ({}) ", target, columns));

                query_builder.push_values(chunk.iter().enumerate(), |mut b, (offset, row)| {
                    if write_index {
                        b.push_bind((start + offset) as i64);
                    }
                    for (value, column_type) in row.iter().zip(types.iter()) {
                        push_value(&mut b, value, *column_type);
                    }
                });

                query_builder
                    .build()
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| query_error("INSERT", e))?;

                debug!(table = %target, rows = chunk.len(), start, "Inserted chunk");
            }
        }

        tx.commit().await.map_err(|e| query_error("COMMIT", e))?;
        Ok(())
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<u64, ExportError> {
        let sql = format!("SELECT COUNT(*) FROM {}", qualified_name(schema, table)?);

        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                let missing = matches!(
                    &e,
                    sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE)
                );
                if missing {
                    ExportError::TableNotFound {
                        schema: schema.to_string(),
                        table: table.to_string(),
                    }
                } else {
                    query_error("SELECT COUNT(*)", e)
                }
            })?;

        Ok(count.max(0) as u64)
    }
}
