//! Integration tests for the Kaggle fetcher against a mock API

mod common;

use common::{census_dataset, county_csv, covid_csv, covid_dataset, zipped, KaggleMock};
use datapipe_common::table::{ColumnType, Value};
use datapipe_ingest::config::{KaggleConfig, StagingConfig};
use datapipe_ingest::fetcher::{DatasetFetcher, FetchError, CREDENTIALS_FILE};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn staged_files(dir: &Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => vec![],
    }
}

#[tokio::test]
async fn test_get_as_table_parses_and_cleans_up() {
    common::init_test_tracing();
    let mock = KaggleMock::start().await;
    mock.serve(&covid_dataset(), "COVID19_state.csv", covid_csv()).await;

    let staging = TempDir::new().unwrap();
    let fetcher = mock.fetcher(staging.path());

    let fetched = fetcher
        .get_as_table(&covid_dataset(), "COVID19_state.csv")
        .await
        .unwrap();

    assert_eq!(fetched.table.row_count(), 3);
    assert_eq!(
        fetched.table.column_names().collect::<Vec<_>>(),
        vec!["State", "Tested", "Infected", "Deaths", "Population"]
    );
    assert_eq!(fetched.table.columns()[1].column_type, ColumnType::BigInt);

    let first = fetched.table.row(0).unwrap();
    assert_eq!(first[0], ("State", &Value::Text("Alabama".into())));

    assert_eq!(fetched.report.source_lines, 4);
    assert_eq!(fetched.report.parsed_rows, 3);
    assert!(fetched.report.lines_match_rows());
    assert_eq!(fetched.report.bytes, covid_csv().len() as u64);
    assert_eq!(fetched.report.sha256.len(), 64);

    assert!(staged_files(staging.path()).is_empty());
}

#[tokio::test]
async fn test_zipped_payload_is_unpacked() {
    let mock = KaggleMock::start().await;
    let body = county_csv(40);
    mock.serve(
        &census_dataset(),
        "acs2017_county_data.csv",
        zipped("acs2017_county_data.csv", &body),
    )
    .await;

    let staging = TempDir::new().unwrap();
    let fetcher = mock.fetcher(staging.path());

    let fetched = fetcher
        .get_as_table(&census_dataset(), "acs2017_county_data.csv")
        .await
        .unwrap();

    assert_eq!(fetched.table.row_count(), 40);
    assert_eq!(fetched.report.bytes, body.len() as u64);
    assert!(staged_files(staging.path()).is_empty());
}

#[tokio::test]
async fn test_download_file_guard_removes_file() {
    let mock = KaggleMock::start().await;
    mock.serve(&covid_dataset(), "COVID19_state.csv", covid_csv()).await;

    let staging = TempDir::new().unwrap();
    let dest = staging.path().join("nested");
    let fetcher = mock.fetcher(staging.path());

    let staged = fetcher
        .download_file(&covid_dataset(), "COVID19_state.csv", &dest)
        .await
        .unwrap();

    let path = staged.path().to_path_buf();
    assert_eq!(path, dest.join("COVID19_state.csv"));
    assert_eq!(fs::read_to_string(&path).unwrap(), covid_csv());
    assert_eq!(staged_files(&dest), vec!["COVID19_state.csv".to_string()]);

    drop(staged);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_keep_staging_files() {
    let mock = KaggleMock::start().await;
    mock.serve(&covid_dataset(), "COVID19_state.csv", covid_csv()).await;

    let staging = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(
        &mock.kaggle_config(),
        StagingConfig {
            dir: staging.path().to_path_buf(),
            keep_files: true,
        },
    )
    .unwrap();

    let fetched = fetcher
        .get_as_table(&covid_dataset(), "COVID19_state.csv")
        .await
        .unwrap();

    assert!(fetched.report.staging_path.exists());
    assert_eq!(staged_files(staging.path()), vec!["COVID19_state.csv".to_string()]);
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let mock = KaggleMock::start().await;
    mock.respond_status(&covid_dataset(), "missing.csv", 404).await;

    let staging = TempDir::new().unwrap();
    let fetcher = mock.fetcher(staging.path());

    let err = fetcher
        .get_as_table(&covid_dataset(), "missing.csv")
        .await
        .unwrap_err();

    assert!(err.is_transfer_error());
    match err {
        FetchError::NotFound { dataset, file } => {
            assert_eq!(dataset, "nightranger77/covid19-state-data");
            assert_eq!(file, "missing.csv");
        },
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(staged_files(staging.path()).is_empty());
}

#[tokio::test]
async fn test_failed_download_leaves_existing_file_alone() {
    let mock = KaggleMock::start().await;
    mock.respond_status(&covid_dataset(), "COVID19_state.csv", 404).await;
    mock.serve(
        &census_dataset(),
        "acs2017_county_data.csv",
        b"PK\x03\x04not really a zip archive".to_vec(),
    )
    .await;

    let staging = TempDir::new().unwrap();
    let previous_covid = staging.path().join("COVID19_state.csv");
    let previous_census = staging.path().join("acs2017_county_data.csv");
    fs::write(&previous_covid, covid_csv()).unwrap();
    fs::write(&previous_census, county_csv(2)).unwrap();

    let fetcher = mock.fetcher(staging.path());

    let err = fetcher
        .download_file(&covid_dataset(), "COVID19_state.csv", staging.path())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound { .. }), "got {err:?}");

    let err = fetcher
        .download_file(&census_dataset(), "acs2017_county_data.csv", staging.path())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transfer { .. }), "got {err:?}");

    assert_eq!(fs::read_to_string(&previous_covid).unwrap(), covid_csv());
    assert_eq!(fs::read_to_string(&previous_census).unwrap(), county_csv(2));

    let mut left = staged_files(staging.path());
    left.sort();
    assert_eq!(left, vec!["COVID19_state.csv", "acs2017_county_data.csv"]);
}

#[tokio::test]
async fn test_rejected_credentials_are_authentication_errors() {
    let mock = KaggleMock::start().await;
    mock.respond_status(&covid_dataset(), "COVID19_state.csv", 401).await;
    mock.respond_status(&census_dataset(), "acs2017_county_data.csv", 403).await;

    let staging = TempDir::new().unwrap();
    let fetcher = mock.fetcher(staging.path());

    let err = fetcher
        .get_as_table(&covid_dataset(), "COVID19_state.csv")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Authentication(_)), "got {err:?}");

    let err = fetcher
        .get_as_table(&census_dataset(), "acs2017_county_data.csv")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Authentication(_)), "got {err:?}");
}

#[tokio::test]
async fn test_server_error_is_transfer_error() {
    let mock = KaggleMock::start().await;
    mock.respond_status(&covid_dataset(), "COVID19_state.csv", 503).await;

    let staging = TempDir::new().unwrap();
    let fetcher = mock.fetcher(staging.path());

    let err = fetcher
        .get_as_table(&covid_dataset(), "COVID19_state.csv")
        .await
        .unwrap_err();
    match err {
        FetchError::Transfer { message, .. } => assert!(message.contains("503")),
        other => panic!("expected Transfer, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_csv_is_parse_error() {
    let mock = KaggleMock::start().await;
    mock.serve(&covid_dataset(), "broken.csv", "a,b\n1,2\n3,4,5\n").await;

    let staging = TempDir::new().unwrap();
    let fetcher = mock.fetcher(staging.path());

    let err = fetcher
        .get_as_table(&covid_dataset(), "broken.csv")
        .await
        .unwrap_err();

    match err {
        FetchError::Parse { file, .. } => assert_eq!(file, "broken.csv"),
        other => panic!("expected Parse, got {other:?}"),
    }
    assert!(staged_files(staging.path()).is_empty());
}

#[tokio::test]
async fn test_empty_download_is_parse_error() {
    let mock = KaggleMock::start().await;
    mock.serve(&covid_dataset(), "empty.csv", "").await;

    let staging = TempDir::new().unwrap();
    let fetcher = mock.fetcher(staging.path());

    let err = fetcher
        .get_as_table(&covid_dataset(), "empty.csv")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Parse { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_credentials_from_kaggle_json() {
    let mock = KaggleMock::start().await;
    mock.serve(&covid_dataset(), "COVID19_state.csv", covid_csv()).await;

    let config_dir = TempDir::new().unwrap();
    fs::write(
        config_dir.path().join(CREDENTIALS_FILE),
        format!(
            r#"{{"username": "{}", "key": "{}"}}"#,
            common::TEST_USERNAME,
            common::TEST_KEY
        ),
    )
    .unwrap();

    let config = KaggleConfig {
        username: None,
        key: None,
        config_dir: Some(config_dir.path().to_path_buf()),
        ..mock.kaggle_config()
    };

    let staging = TempDir::new().unwrap();
    let fetcher = DatasetFetcher::new(
        &config,
        StagingConfig {
            dir: staging.path().to_path_buf(),
            keep_files: false,
        },
    )
    .unwrap();

    let fetched = fetcher
        .get_as_table(&covid_dataset(), "COVID19_state.csv")
        .await
        .unwrap();
    assert_eq!(fetched.table.row_count(), 3);
}

#[test]
fn test_missing_credentials_fail_at_construction() {
    let empty_dir = TempDir::new().unwrap();
    let config = KaggleConfig {
        api_base: "http://127.0.0.1:9/api/v1".to_string(),
        timeout_secs: 5,
        user_agent: "test".to_string(),
        username: None,
        key: None,
        config_dir: Some(empty_dir.path().to_path_buf()),
    };

    let result = DatasetFetcher::new(&config, StagingConfig::default());
    assert!(matches!(result, Err(FetchError::Authentication(_))));
}
