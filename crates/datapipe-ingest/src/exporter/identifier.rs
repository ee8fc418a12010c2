//! SQL identifier quoting
//!
//! Schema, table and column names come from configuration and file headers,
//! so they are always emitted as quoted identifiers and never spliced raw.

use super::ExportError;

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// Wrap `name` in double quotes, doubling any embedded quotes
pub fn quote_identifier(name: &str) -> Result<String, ExportError> {
    if name.is_empty() {
        return Err(ExportError::InvalidIdentifier("identifier is empty".to_string()));
    }
    if name.contains('\0') {
        return Err(ExportError::InvalidIdentifier(format!(
            "identifier {:?} contains a NUL byte",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(ExportError::InvalidIdentifier(format!(
            "identifier {:?} is longer than {} bytes",
            name, MAX_IDENTIFIER_BYTES
        )));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// `"schema"."table"`
pub fn qualified_name(schema: &str, table: &str) -> Result<String, ExportError> {
    Ok(format!("{}.{}", quote_identifier(schema)?, quote_identifier(table)?))
}
