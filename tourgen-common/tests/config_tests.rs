//! Configuration discovery tests
//!
//! Tests touching TOURGEN_* environment variables are marked #[serial] so they do
//! not race with each other.

use serde::Deserialize;
use serial_test::serial;
use std::io::Write;
use std::path::Path;
use tourgen_common::config::{env_non_empty, load_toml, resolve_config_path, ConfigSource};

const TEST_ENV_VAR: &str = "TOURGEN_CONFIG_TEST_PATH";

#[derive(Debug, Deserialize)]
struct Sample {
    name: String,
    #[serde(default)]
    retries: u32,
}

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    std::env::set_var(TEST_ENV_VAR, "/tmp/from-env.toml");

    let (path, source) = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), TEST_ENV_VAR).unwrap();
    assert_eq!(path, Path::new("/tmp/from-cli.toml"));
    assert_eq!(source, ConfigSource::CommandLine);

    std::env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_used_without_cli_argument() {
    std::env::set_var(TEST_ENV_VAR, "/tmp/from-env.toml");

    let (path, source) = resolve_config_path(None, TEST_ENV_VAR).unwrap();
    assert_eq!(path, Path::new("/tmp/from-env.toml"));
    assert_eq!(source, ConfigSource::Environment);

    std::env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_environment_value_is_ignored() {
    std::env::set_var(TEST_ENV_VAR, "   ");

    if let Some((_, source)) = resolve_config_path(None, TEST_ENV_VAR) {
        assert_ne!(source, ConfigSource::Environment);
    }
    assert_eq!(env_non_empty(TEST_ENV_VAR), None);

    std::env::remove_var(TEST_ENV_VAR);
}

#[test]
fn test_load_toml_parses_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name = \"seoul\"\nretries = 3").unwrap();

    let sample: Sample = load_toml(file.path()).unwrap();
    assert_eq!(sample.name, "seoul");
    assert_eq!(sample.retries, 3);
}

#[test]
fn test_load_toml_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name = ").unwrap();

    let err = load_toml::<Sample>(file.path()).unwrap_err();
    assert!(err.to_string().contains("Parse"), "unexpected error: {err}");
}

#[test]
fn test_load_toml_missing_file() {
    let err = load_toml::<Sample>(Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(err.to_string().contains("Read"), "unexpected error: {err}");
}
