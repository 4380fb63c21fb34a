//! Loading configuration files from disk.

use std::io::Write;

use gatekeeper_config::{ConfigLoader, LogFormat};
use tempfile::NamedTempFile;

fn file_with(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_toml_file() {
    let file = file_with(
        ".toml",
        r#"
            [directory]
            url = "https://portal.example.com"

            [logging]
            format = "pretty"
        "#,
    );

    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
    assert_eq!(config.directory.url, "https://portal.example.com");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.refresh.max_attempts, 4);
}

#[test]
fn test_json_file() {
    let file = file_with(".json", r#"{"refresh": {"max_attempts": 2}}"#);

    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
    assert_eq!(config.refresh.max_attempts, 2);
}

#[test]
fn test_unknown_extension() {
    let file = file_with(".yaml", "server: {}");
    assert!(ConfigLoader::new().with_file(file.path()).is_err());
}

#[test]
fn test_unknown_field_in_file() {
    let file = file_with(".toml", "[server]\nport = 9123\n");
    assert!(ConfigLoader::new().with_file(file.path()).is_err());
}

#[test]
fn test_invalid_values_fail_validation() {
    let file = file_with(".toml", "[directory]\nsession_url = \"shoreline:9107\"\n");
    let loader = ConfigLoader::new().with_file(file.path()).unwrap();
    let err = loader.load().unwrap_err();
    assert!(err.to_string().contains("directory.session_url"));
}
