//! In-memory tabular model
//!
//! A [`Table`] is an ordered list of rows over a fixed set of named, typed
//! columns. Tables are built from delimited text with the same defaults a
//! dataframe CSV reader applies:
//!
//! - the first record is the header
//! - blank header cells are named `Unnamed: <index>`
//! - repeated header names get a `.1`, `.2`, ... suffix
//! - the usual NA markers (`""`, `NA`, `NaN`, `null`, ...) become [`Value::Null`]
//! - every column is typed by inspecting all of its non-null cells
//!
//! Rows whose field count differs from the header are rejected, so a table
//! either parses completely or not at all.

use crate::error::{CommonError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Cell strings that are read as missing values
pub const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Storage type inferred for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Text,
}

impl ColumnType {
    /// PostgreSQL type name used when creating a table for this column
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table from already-typed parts.
    ///
    /// Every row must have exactly one value per column.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(CommonError::parse(
                    idx as u64 + 1,
                    format!("expected {} fields, saw {}", columns.len(), row.len()),
                ));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Parse comma-delimited text with a header row
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(CommonError::EmptyInput);
        }

        let mut raw_rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            raw_rows.push(record.iter().map(str::to_owned).collect::<Vec<_>>());
        }

        let names = dedupe_header(headers.iter());
        Ok(Self::from_raw(names, raw_rows))
    }

    /// Parse a comma-delimited file with a header row
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    fn from_raw(names: Vec<String>, raw_rows: Vec<Vec<String>>) -> Self {
        let types: Vec<ColumnType> = (0..names.len())
            .map(|idx| infer_type(raw_rows.iter().map(|row| row[idx].as_str())))
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(types.iter())
                    .map(|(cell, ty)| convert(cell, *ty))
                    .collect()
            })
            .collect();

        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, column_type)| Column { name, column_type })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `idx` as `(column name, value)` pairs
    pub fn row(&self, idx: usize) -> Option<Vec<(&str, &Value)>> {
        self.rows.get(idx).map(|row| {
            self.columns
                .iter()
                .map(|c| c.name.as_str())
                .zip(row.iter())
                .collect()
        })
    }
}

fn is_na(cell: &str) -> bool {
    NA_VALUES.contains(&cell)
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn infer_type<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut all_bool = true;
    let mut all_int = true;
    let mut all_float = true;
    let mut seen_value = false;

    for cell in cells.filter(|c| !is_na(c)) {
        seen_value = true;
        all_bool &= parse_bool(cell).is_some();
        all_int &= cell.parse::<i64>().is_ok();
        all_float &= cell.parse::<f64>().is_ok();
        if !all_bool && !all_int && !all_float {
            return ColumnType::Text;
        }
    }

    match (seen_value, all_bool, all_int, all_float) {
        (false, ..) => ColumnType::Text,
        (true, true, ..) => ColumnType::Boolean,
        (true, _, true, _) => ColumnType::BigInt,
        (true, _, _, true) => ColumnType::Double,
        _ => ColumnType::Text,
    }
}

// Types come from `infer_type` over the same cells, so the parses below only
// fail on NA cells.
fn convert(cell: String, column_type: ColumnType) -> Value {
    if is_na(&cell) {
        return Value::Null;
    }
    match column_type {
        ColumnType::Boolean => parse_bool(&cell).map(Value::Bool).unwrap_or(Value::Null),
        ColumnType::BigInt => cell.parse().map(Value::Int).unwrap_or(Value::Null),
        ColumnType::Double => cell.parse().map(Value::Float).unwrap_or(Value::Null),
        ColumnType::Text => Value::Text(cell),
    }
}

fn dedupe_header<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let raw: Vec<String> = raw
        .enumerate()
        .map(|(idx, name)| {
            if name.trim().is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                name.to_string()
            }
        })
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(raw.len());

    for name in raw {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", name, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        names.push(candidate);
    }

    names
}
