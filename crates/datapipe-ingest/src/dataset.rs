//! Dataset references and ingestion targets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid dataset reference '{input}': {reason}")]
pub struct DatasetRefError {
    pub input: String,
    pub reason: &'static str,
}

impl DatasetRefError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// A remote dataset, identified as `owner/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub owner: String,
    pub name: String,
}

impl DatasetRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for DatasetRef {
    type Err = DatasetRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, name) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| DatasetRefError::new(s, "expected 'owner/name'"))?;

        if owner.is_empty() || name.is_empty() {
            return Err(DatasetRefError::new(s, "owner and name must be non-empty"));
        }
        if name.contains('/') {
            return Err(DatasetRefError::new(s, "name must not contain '/'"));
        }

        Ok(Self::new(owner, name))
    }
}

/// One file to ingest: which dataset, which file in it, and where it lands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub dataset: DatasetRef,
    pub file: String,

    /// Target table name; derived from `file` when absent
    pub table: Option<String>,
}

impl DatasetSpec {
    pub fn new(dataset: DatasetRef, file: impl Into<String>) -> Self {
        Self {
            dataset,
            file: file.into(),
            table: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// `acs2017_county_data.csv` -> `acs2017_county_data`, `COVID19_state.csv` -> `covid19_state`
    pub fn table_name(&self) -> String {
        match &self.table {
            Some(table) => table.clone(),
            None => self.file.replace(".csv", "").to_lowercase(),
        }
    }
}

impl fmt::Display for DatasetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dataset, self.file)
    }
}

/// Parses `owner/name:file` or `owner/name:file=table`
impl FromStr for DatasetSpec {
    type Err = DatasetRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dataset, rest) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| DatasetRefError::new(s, "expected 'owner/name:file'"))?;

        let dataset: DatasetRef = dataset.parse()?;
        let (file, table) = match rest.split_once('=') {
            Some((file, table)) => (file.trim(), Some(table.trim())),
            None => (rest.trim(), None),
        };

        if file.is_empty() {
            return Err(DatasetRefError::new(s, "file name must be non-empty"));
        }

        let spec = DatasetSpec::new(dataset, file);
        match table {
            Some("") => Err(DatasetRefError::new(s, "table name must be non-empty")),
            Some(table) => Ok(spec.with_table(table)),
            None => Ok(spec),
        }
    }
}
