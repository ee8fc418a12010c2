//! File digests for staged downloads

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Hex-encoded SHA-256 of a file's contents
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    sha256_reader(&mut file)
}

/// Hex-encoded SHA-256 of everything readable from `reader`
pub fn sha256_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Number of newline-terminated lines in a file, counting a trailing
/// unterminated line as well
pub fn count_lines(path: impl AsRef<Path>) -> Result<u64> {
    let mut file = std::fs::File::open(path)?;
    let mut buffer = [0u8; 8192];
    let mut lines = 0u64;
    let mut last = None;

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        lines += buffer[..bytes_read].iter().filter(|b| **b == b'\n').count() as u64;
        last = Some(buffer[bytes_read - 1]);
    }

    if matches!(last, Some(b) if b != b'\n') {
        lines += 1;
    }

    Ok(lines)
}
