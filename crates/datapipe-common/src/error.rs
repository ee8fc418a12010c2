//! Error types shared across datapipe crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited text could not be parsed into a table
    #[error("Parse error at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// The input has no header row at all
    #[error("No columns to parse from input")]
    EmptyInput,
}

impl CommonError {
    pub fn parse(line: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

impl From<csv::Error> for CommonError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => CommonError::Io(io),
            csv::ErrorKind::UnequalLengths {
                expected_len, len, ..
            } => CommonError::parse(
                line,
                format!("expected {} fields, saw {}", expected_len, len),
            ),
            csv::ErrorKind::Utf8 { err, .. } => CommonError::parse(line, err.to_string()),
            other => CommonError::parse(line, format!("{:?}", other)),
        }
    }
}
