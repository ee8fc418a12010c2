//! Shared fixtures for datapipe-ingest integration tests
//!
//! - [`TestPostgres`]: a throwaway PostgreSQL container with an exporter
//!   pointed at it
//! - [`KaggleMock`]: a wiremock server answering the dataset download endpoint
//! - CSV fixture builders

#![allow(dead_code)]

use anyhow::{Context, Result};
use datapipe_ingest::config::{DatabaseConfig, KaggleConfig, StagingConfig};
use datapipe_ingest::dataset::DatasetRef;
use datapipe_ingest::fetcher::DatasetFetcher;
use std::io::Write;
use std::path::Path;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_USERNAME: &str = "tester";
pub const TEST_KEY: &str = "0123456789abcdef";

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        Ok(Self {
            container,
            connection_string,
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn database_config(&self, schema: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: self.connection_string.clone(),
            schema: schema.to_string(),
            connect_timeout_secs: 30,
        }
    }
}

// ============================================================================
// Kaggle API Mock
// ============================================================================

pub struct KaggleMock {
    pub server: MockServer,
}

impl KaggleMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn download_path(dataset: &DatasetRef, file: &str) -> String {
        format!("/api/v1/datasets/download/{}/{}/{}", dataset.owner, dataset.name, file)
    }

    /// Serve `body` for `dataset`/`file` to requests carrying the test credentials
    pub async fn serve(&self, dataset: &DatasetRef, file: &str, body: impl Into<Vec<u8>>) {
        Mock::given(method("GET"))
            .and(path(Self::download_path(dataset, file)))
            .and(basic_auth(TEST_USERNAME, TEST_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
            .mount(&self.server)
            .await;
    }

    pub async fn respond_status(&self, dataset: &DatasetRef, file: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(Self::download_path(dataset, file)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub fn kaggle_config(&self) -> KaggleConfig {
        KaggleConfig {
            api_base: format!("{}/api/v1", self.server.uri()),
            timeout_secs: 10,
            user_agent: "datapipe-ingest-tests".to_string(),
            username: Some(TEST_USERNAME.to_string()),
            key: Some(TEST_KEY.to_string()),
            config_dir: None,
        }
    }

    pub fn fetcher(&self, staging_dir: &Path) -> DatasetFetcher {
        let staging = StagingConfig {
            dir: staging_dir.to_path_buf(),
            keep_files: false,
        };
        DatasetFetcher::new(&self.kaggle_config(), staging).expect("fetcher")
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn census_dataset() -> DatasetRef {
    DatasetRef::new("muonneutrino", "us-census-demographic-data")
}

pub fn covid_dataset() -> DatasetRef {
    DatasetRef::new("nightranger77", "covid19-state-data")
}

/// County-level CSV shaped like `acs2017_county_data.csv` with `rows` data rows
pub fn county_csv(rows: usize) -> String {
    let mut csv = String::from("CountyId,State,County,TotalPop,Men,Women,Income,Poverty\n");
    for i in 0..rows {
        let income = if i % 97 == 0 {
            String::new()
        } else {
            format!("{}", 30000 + (i * 17) % 50000)
        };
        csv.push_str(&format!(
            "{},State {},County {},{},{},{},{},{:.1}\n",
            1001 + i,
            i % 52,
            i,
            1000 + i * 3,
            500 + i,
            500 + i * 2,
            income,
            (i % 400) as f64 / 10.0
        ));
    }
    csv
}

pub fn covid_csv() -> String {
    "State,Tested,Infected,Deaths,Population\n\
     Alabama,21583,5079,164,4908621\n\
     Alaska,8038,277,8,734002\n\
     Arizona,42109,3705,122,7378494\n"
        .to_string()
}

/// Zip `body` as a single entry named `name`
pub fn zipped(name: &str, body: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file(name, zip::write::FileOptions::default())
        .expect("start zip entry");
    writer.write_all(body.as_bytes()).expect("write zip entry");
    writer.finish().expect("finish zip").into_inner()
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,datapipe_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
