//! datapipe common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities for the datapipe workspace.
//!
//! - **Table**: the in-memory tabular model parsed from delimited text
//! - **Checksums**: SHA-256 digests of staged files
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use datapipe_common::table::Table;
//!
//! fn load(path: &str) -> datapipe_common::Result<()> {
//!     let table = Table::from_csv_path(path)?;
//!     tracing::info!(rows = table.row_count(), "loaded");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod table;

pub use error::{CommonError, Result};
