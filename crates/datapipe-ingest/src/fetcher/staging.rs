//! Scoped staging files
//!
//! A [`StagingFile`] owns a downloaded file for as long as it is needed and
//! removes it when dropped, so every exit path of a fetch (success, parse
//! failure, early return) leaves the staging directory clean.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    keep: bool,
}

impl StagingFile {
    pub fn new(path: impl Into<PathBuf>, keep: bool) -> Self {
        Self {
            path: path.into(),
            keep,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.keep {
            debug!(path = %self.path.display(), "Keeping staging file");
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staging file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staging file"),
        }
    }
}

/// Local file name for a remote file, rejecting anything that would escape
/// the staging directory
pub fn local_file_name(file: &str) -> Option<&str> {
    let name = Path::new(file).file_name()?.to_str()?;
    (name == file && name != "." && name != "..").then_some(name)
}
