//! Loading feature schemas from disk.

use std::io::Write;

use funrec_inputs::prelude::*;
use funrec_inputs::schema::SCHEMA_ENV;
use funrec_tensor::Device;
use tempfile::NamedTempFile;

const SCHEMA: &str = r#"{
    "features": [
        {"kind": "sparse", "name": "user_id", "vocabulary_size": 100, "embedding_dim": 8},
        {"kind": "sparse", "name": "item_id", "vocabulary_size": 300, "embedding_dim": 8,
         "group_name": "item"},
        {"kind": "varlen_sparse", "name": "hist_item_id", "vocabulary_size": 300,
         "embedding_dim": 8, "embedding_name": "item_id", "group_name": "item",
         "maxlen": 10, "length_name": "hist_len"},
        {"kind": "dense", "name": "ctr", "dimension": 2, "dtype": "float64"}
    ],
    "tables": {"init_std": 0.01, "linear": true, "device": "cuda:1", "seed": 42}
}"#;

fn write_schema(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_schema_file() {
    let file = write_schema(SCHEMA);
    let config = InputConfig::from_path(file.path()).unwrap();

    assert_eq!(config.features.len(), 4);
    assert!(config.tables.linear);
    assert_eq!(config.tables.device, Device::Cuda(1));

    let columns = config.columns().unwrap();
    let layout = build_layout(&columns).unwrap();
    assert_eq!(layout.total_width(), 1 + 1 + 10 + 1 + 2);

    let tables = build_tables(&columns, &config.tables).unwrap();
    assert_eq!(tables.len(), 2);
    assert!(tables.iter().all(|t| t.dim() == 1));
    assert!(tables.iter().all(|t| t.device() == Device::Cuda(1)));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = InputConfig::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, InputError::Io(_)));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let file = write_schema(r#"{"features": [{"kind": "sparse"}]}"#);
    let err = InputConfig::from_path(file.path()).unwrap_err();
    assert!(matches!(err, InputError::Parse(_)));
}

#[test]
fn test_oversized_sizes_fail_instead_of_wrapping() {
    let file = write_schema(
        r#"{"features": [
            {"kind": "dense", "name": "wide", "dimension": 18446744073709551615},
            {"kind": "sparse", "name": "user_id", "vocabulary_size": 8589934592,
             "embedding_dim": 8589934592}
        ]}"#,
    );
    let columns = InputConfig::from_path(file.path()).unwrap().columns().unwrap();
    assert!(matches!(
        build_layout(&columns),
        Err(InputError::InvalidFeatureConfig { .. })
    ));
    assert!(matches!(
        build_tables(&columns, &TableOptions::default()),
        Err(InputError::InvalidFeatureConfig { .. })
    ));
}

#[test]
fn test_from_env() {
    let file = write_schema(SCHEMA);
    std::env::set_var(SCHEMA_ENV, file.path());
    let config = InputConfig::from_env().unwrap();
    assert_eq!(config.tables.seed, Some(42));

    std::env::remove_var(SCHEMA_ENV);
    assert!(matches!(
        InputConfig::from_env(),
        Err(InputError::InvalidFeatureConfig { .. })
    ));
}
