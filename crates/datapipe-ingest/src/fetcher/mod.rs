//! Dataset download and parsing
//!
//! [`DatasetFetcher`] authenticates against the Kaggle API on construction,
//! downloads single files from public datasets into a staging directory and
//! parses them into a [`Table`].

mod credentials;
mod staging;

pub use credentials::{KaggleCredentials, CREDENTIALS_FILE};
pub use staging::StagingFile;

use crate::config::{KaggleConfig, StagingConfig};
use crate::dataset::DatasetRef;
use datapipe_common::checksum::{count_lines, sha256_file};
use datapipe_common::table::Table;
use datapipe_common::CommonError;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

#[derive(Error, Debug)]
pub enum FetchError {
    /// Credentials missing, unreadable or rejected by the service
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transfer of '{file}' from {dataset} failed: {message}")]
    Transfer {
        dataset: String,
        file: String,
        message: String,
    },

    #[error("File '{file}' not found in dataset {dataset}")]
    NotFound { dataset: String, file: String },

    #[error("Staging error: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Failed to parse '{file}': {source}")]
    Parse {
        file: String,
        #[source]
        source: CommonError,
    },
}

impl FetchError {
    /// True when the file could not be obtained, including a missing dataset or file
    pub fn is_transfer_error(&self) -> bool {
        matches!(self, FetchError::Transfer { .. } | FetchError::NotFound { .. })
    }

    fn transfer(dataset: &DatasetRef, file: &str, message: impl Into<String>) -> Self {
        Self::Transfer {
            dataset: dataset.to_string(),
            file: file.to_string(),
            message: message.into(),
        }
    }
}

/// Diagnostics gathered while staging and parsing one file
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub dataset: String,
    pub file: String,
    pub staging_path: PathBuf,
    pub bytes: u64,
    pub sha256: String,

    /// Raw lines in the staged file, header included
    pub source_lines: u64,
    pub parsed_rows: usize,
}

impl FetchReport {
    /// Whether every non-header line became exactly one row.
    ///
    /// Quoted fields spanning lines and blank lines make this false without
    /// anything being wrong, so it is informational only.
    pub fn lines_match_rows(&self) -> bool {
        self.source_lines.saturating_sub(1) == self.parsed_rows as u64
    }
}

#[derive(Debug)]
pub struct FetchedTable {
    pub table: Table,
    pub report: FetchReport,
}

pub struct DatasetFetcher {
    client: Client,
    api_base: Url,
    credentials: KaggleCredentials,
    staging: StagingConfig,
}

impl DatasetFetcher {
    /// Authenticate and build a fetcher.
    ///
    /// Fails with [`FetchError::Authentication`] when no usable credentials
    /// are found.
    pub fn new(config: &KaggleConfig, staging: StagingConfig) -> Result<Self, FetchError> {
        let credentials = Self::authenticate(config)?;

        let api_base = Url::parse(&config.api_base).map_err(|e| {
            FetchError::Authentication(format!("invalid API base '{}': {}", config.api_base, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Authentication(format!("failed to build HTTP client: {}", e)))?;

        info!(username = %credentials.username, api = %api_base, "Authenticated with Kaggle");

        Ok(Self {
            client,
            api_base,
            credentials,
            staging,
        })
    }

    pub fn authenticate(config: &KaggleConfig) -> Result<KaggleCredentials, FetchError> {
        KaggleCredentials::resolve(config)
    }

    fn download_url(&self, dataset: &DatasetRef, file: &str) -> Result<Url, FetchError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::transfer(dataset, file, "API base URL cannot hold a path"))?
            .pop_if_empty()
            .extend([
                "datasets",
                "download",
                dataset.owner.as_str(),
                dataset.name.as_str(),
                file,
            ]);
        Ok(url)
    }

    /// Download `file` of `dataset` into `destination_dir`.
    ///
    /// The returned guard deletes the file when dropped unless staging files
    /// are configured to be kept. Zipped payloads are unpacked so the guard
    /// always points at the plain file.
    #[instrument(skip(self, dataset), fields(dataset = %dataset))]
    pub async fn download_file(
        &self,
        dataset: &DatasetRef,
        file: &str,
        destination_dir: &Path,
    ) -> Result<StagingFile, FetchError> {
        let local_name = staging::local_file_name(file)
            .ok_or_else(|| FetchError::transfer(dataset, file, "file name is not a plain file name"))?;

        tokio::fs::create_dir_all(destination_dir).await?;
        let target_path = destination_dir.join(local_name);
        let download = StagingFile::new(
            destination_dir.join(format!("{}.download", local_name)),
            false,
        );

        let url = self.download_url(dataset, file)?;
        info!(file, "Downloading");

        let response = self
            .client
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.key))
            .send()
            .await
            .map_err(|e| FetchError::transfer(dataset, file, e.to_string()))?;

        match response.status() {
            status if status.is_success() => {},
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Authentication(format!(
                    "Kaggle rejected the credentials for {} ({})",
                    dataset,
                    response.status()
                )));
            },
            StatusCode::NOT_FOUND => {
                return Err(FetchError::NotFound {
                    dataset: dataset.to_string(),
                    file: file.to_string(),
                });
            },
            status => {
                return Err(FetchError::transfer(dataset, file, format!("HTTP {}", status)));
            },
        }

        let total_size = response.content_length().unwrap_or(0);
        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(local_name.to_string());

        let mut out = tokio::fs::File::create(download.path()).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::transfer(dataset, file, e.to_string()))?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            pb.set_position(written);
        }
        out.flush().await?;
        drop(out);
        pb.finish_and_clear();

        // Only a complete payload replaces whatever is already at the target path
        if is_zip(download.path())? {
            debug!(file, "Payload is zipped, extracting");
            let extracted = StagingFile::new(
                destination_dir.join(format!("{}.extract", local_name)),
                false,
            );
            extract_zip_entry(download.path(), local_name, extracted.path())
                .map_err(|e| FetchError::transfer(dataset, file, e))?;
            tokio::fs::rename(extracted.path(), &target_path).await?;
        } else {
            tokio::fs::rename(download.path(), &target_path).await?;
        }
        let target = StagingFile::new(target_path, self.staging.keep_files);

        info!(file, bytes = written, path = %target.path().display(), "Downloaded");
        Ok(target)
    }

    /// Download `file` of `dataset` and parse it as CSV.
    ///
    /// The staged file is removed before returning, on success and on error.
    #[instrument(skip(self, dataset), fields(dataset = %dataset))]
    pub async fn get_as_table(
        &self,
        dataset: &DatasetRef,
        file: &str,
    ) -> Result<FetchedTable, FetchError> {
        let staged = self.download_file(dataset, file, &self.staging.dir).await?;
        let path = staged.path().to_path_buf();

        let bytes = tokio::fs::metadata(&path).await?.len();
        let sha256 = sha256_file(&path).map_err(|e| parse_error(file, e))?;
        let source_lines = count_lines(&path).map_err(|e| parse_error(file, e))?;

        let table = Table::from_csv_path(&path).map_err(|e| parse_error(file, e))?;

        let report = FetchReport {
            dataset: dataset.to_string(),
            file: file.to_string(),
            staging_path: path,
            bytes,
            sha256,
            source_lines,
            parsed_rows: table.row_count(),
        };

        if report.lines_match_rows() {
            info!(
                file,
                lines = report.source_lines,
                rows = report.parsed_rows,
                columns = table.columns().len(),
                "Parsed"
            );
        } else {
            warn!(
                file,
                lines = report.source_lines,
                rows = report.parsed_rows,
                "Parsed row count differs from data line count (multi-line fields or blank lines)"
            );
        }

        drop(staged);
        Ok(FetchedTable { table, report })
    }
}

fn parse_error(file: &str, source: CommonError) -> FetchError {
    match source {
        CommonError::Io(io) => FetchError::Staging(io),
        source => FetchError::Parse {
            file: file.to_string(),
            source,
        },
    }
}

fn is_zip(path: &Path) -> Result<bool, std::io::Error> {
    let mut magic = [0u8; 4];
    let mut f = std::fs::File::open(path)?;
    match f.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == ZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Extract the entry named `name` (or the archive's only entry) to `dest`
fn extract_zip_entry(archive_path: &Path, name: &str, dest: &Path) -> Result<(), String> {
    let file = std::fs::File::open(archive_path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| format!("bad zip archive: {}", e))?;

    let found = (0..archive.len()).find(|&i| {
        archive
            .by_index(i)
            .map(|entry| entry.name() == name)
            .unwrap_or(false)
    });
    let index = match found {
        Some(index) => index,
        None if archive.len() == 1 => 0,
        None => return Err(format!("archive does not contain '{}'", name)),
    };

    let mut entry = archive.by_index(index).map_err(|e| e.to_string())?;
    let mut out = std::fs::File::create(dest).map_err(|e| e.to_string())?;
    std::io::copy(&mut entry, &mut out).map_err(|e| e.to_string())?;
    Ok(())
}
