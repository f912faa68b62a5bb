use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

mod common;

use common::test_helpers::{clean_document, flawed_document, write_file};

fn kml_validate(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kml-validate"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("KML_VALIDATE_LEVEL")
        .env_remove("KML_VALIDATE_FORMAT")
        .output()
        .expect("Failed to execute command")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_cli_help_output() {
    let output = kml_validate(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Check KML 2.2 documents against the conformance rules"));
    assert!(stdout.contains("--level"));
    assert!(stdout.contains("--extensions"));
    assert!(stdout.contains("--threads"));
    assert!(stdout.contains("--allow-scheme"));
    assert!(stdout.contains("--list-rules"));
    assert!(stdout.contains("--format"));
}

#[test]
fn test_cli_version_output() {
    let output = kml_validate(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("kml-validate 0.2.0"));
}

#[test]
fn test_cli_list_rules() {
    let output = kml_validate(&["--list-rules", "--level", "1"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("document (level 1)"));
    assert!(stdout.contains("style-url"));
    assert!(!stdout.contains("(level 2)"));
}

#[test]
fn test_cli_unknown_level_uses_level_one() {
    let output = kml_validate(&["--list-rules", "--level", "7"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("document (level 1)"));
    assert!(!stdout.contains("(level 2)"));
}

#[test]
fn test_cli_clean_document_passes() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "clean.kml", &clean_document());

    let output = kml_validate(&["--level", "3", path_str(&file)]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Total files: 1"));
    assert!(stdout.contains("Valid: 1"));
}

#[test]
fn test_cli_flawed_document_fails() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "flawed.kml", &flawed_document());

    let output = kml_validate(&["--level", "1", path_str(dir.path())]);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("flawed.kml"));
    assert!(stdout.contains("style-url"));
    assert!(stdout.contains("Invalid: 1"));
}

#[test]
fn test_cli_json_output() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.kml", &clean_document());
    write_file(dir.path(), "b.kml", &flawed_document());

    let output = kml_validate(&["--format", "json", "--level", "2", path_str(dir.path())]);

    assert_eq!(output.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["total_files"], 2);
    assert_eq!(value["valid_files"], 1);
    assert_eq!(value["invalid_files"], 1);
    assert_eq!(value["file_results"][1]["status"]["Invalid"]["failed_rules"], 3);
}

#[test]
fn test_cli_missing_path_is_a_precondition_failure() {
    let output = kml_validate(&["/nonexistent/directory/path"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Path does not exist"));
}

#[test]
fn test_cli_conflicting_options() {
    let dir = TempDir::new().unwrap();

    let output = kml_validate(&["--verbose", "--quiet", path_str(dir.path())]);

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("cannot be used with"));
}

#[test]
fn test_cli_invalid_config_file() {
    let dir = TempDir::new().unwrap();
    let config = write_file(dir.path(), "kml-validate.toml", "[validation]\nthreads = 0\n");
    let file = write_file(dir.path(), "clean.kml", &clean_document());

    let output = kml_validate(&["--config", path_str(&config), path_str(&file)]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_extension_filter() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "clean.kml", &clean_document());
    write_file(dir.path(), "flawed.xml", &flawed_document());

    let output = kml_validate(&["--extensions", "kml", path_str(dir.path())]);
    assert_eq!(output.status.code(), Some(0));

    let output = kml_validate(&["--extensions", "kml,xml", path_str(dir.path())]);
    assert_eq!(output.status.code(), Some(1));
}
