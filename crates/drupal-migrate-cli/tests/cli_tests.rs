//! CLI integration tests for drupal-migrate.
//!
//! These tests verify argument parsing, exit codes, and complete
//! import / status / rollback runs against a temporary SQLite target.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the drupal-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("drupal-migrate").unwrap()
}

/// Write a configuration with two inline-data migrations into `dir`.
fn write_config(dir: &Path) -> String {
    let target = dir.join("target.db");
    let config = format!(
        r#"
target:
  url: "sqlite://{}"
migrations:
  - id: d6_taxonomy_term
    label: Taxonomy terms
    migration_tags: [Content]
    source:
      plugin: embedded_data
      data_rows:
        - {{tid: 1, vid: 1, name: Rust}}
      ids:
        tid:
          type: integer
    process:
      tid: tid
      name: name
      vid:
        plugin: migration_lookup
        migration: d6_taxonomy_vocabulary
        source: vid
    destination:
      plugin: entity:taxonomy_term
    migration_dependencies:
      required: [d6_taxonomy_vocabulary]
  - id: d6_taxonomy_vocabulary
    label: Taxonomy vocabularies
    source:
      plugin: embedded_data
      data_rows:
        - {{vid: 1, name: Tags}}
        - {{vid: 2, name: Forums}}
      ids:
        vid:
          type: integer
    process:
      vid:
        plugin: machine_name
        source: name
      name: name
    destination:
      plugin: entity:taxonomy_vocabulary
"#,
        target.display()
    );
    let path = dir.join("config.yaml");
    std::fs::write(&path, config).unwrap();
    path.to_str().unwrap().to_string()
}

fn setup() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    (dir, config)
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("messages"))
        .stdout(predicate::str::contains("reset-status"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_import_subcommand_help() {
    cmd()
        .args(["import", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--limit"))
        .stdout(predicate::str::contains("--update"))
        .stdout(predicate::str::contains("--execute-dependencies"))
        .stdout(predicate::str::contains("--tag"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("drupal-migrate"));
}

#[test]
fn test_global_flags_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--state-file"))
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "list"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "list"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_target_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "migrations: []").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "list"])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_migration_exits_with_code_1() {
    let (_dir, config) = setup();
    cmd()
        .args(["--config", &config, "import", "d6_user"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown migration: d6_user"));
}

// =============================================================================
// Workflow Tests
// =============================================================================

#[test]
fn test_list_in_dependency_order() {
    let (_dir, config) = setup();
    cmd()
        .args(["--config", &config, "--output-json", "list"])
        .assert()
        .success()
        .stdout(predicate::str::diff(
            "[\n  \"d6_taxonomy_vocabulary\",\n  \"d6_taxonomy_term\"\n]\n",
        ));
}

#[test]
fn test_import_status_rollback() {
    let (dir, config) = setup();
    let state_file = dir.path().join("state.json");
    let state_file = state_file.to_str().unwrap();

    cmd()
        .args(["--config", &config, "--state-file", state_file, "--output-json", "import"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"operation\": \"import\""))
        .stdout(predicate::str::contains("\"status\": \"completed\""))
        .stdout(predicate::str::contains("\"created\": 3"));
    assert!(Path::new(state_file).exists());

    cmd()
        .args(["--config", &config, "--state-file", state_file, "--output-json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"imported\": 2"))
        .stdout(predicate::str::contains("\"unprocessed\": 0"));

    // A second import finds nothing to do.
    cmd()
        .args(["--config", &config, "--state-file", state_file, "--output-json", "import"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"unchanged\": 3"));

    cmd()
        .args(["--config", &config, "--state-file", state_file, "rollback"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rollback completed"));
}

#[test]
fn test_skipped_dependent_exits_with_code_3() {
    let (_dir, config) = setup();
    cmd()
        .args(["--config", &config, "--output-json", "import", "--tag", "Content"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains(
            "requirements not met: d6_taxonomy_vocabulary",
        ));
}

#[test]
fn test_changed_config_rejects_state_file_without_force() {
    let (dir, config) = setup();
    let state_file = dir.path().join("state.json");
    let state_file = state_file.to_str().unwrap();

    cmd()
        .args(["--config", &config, "--state-file", state_file, "import"])
        .assert()
        .success();

    let changed = std::fs::read_to_string(&config)
        .unwrap()
        .replace("label: Taxonomy terms", "label: Terms");
    std::fs::write(&config, changed).unwrap();

    cmd()
        .args(["--config", &config, "--state-file", state_file, "status"])
        .assert()
        .code(1);

    cmd()
        .args(["--config", &config, "--state-file", state_file, "--force", "status"])
        .assert()
        .success();
}

#[test]
fn test_reset_status_reports_previous_status() {
    let (_dir, config) = setup();
    cmd()
        .args(["--config", &config, "reset-status", "d6_taxonomy_term"])
        .assert()
        .success()
        .stdout(predicate::str::contains("d6_taxonomy_term: idle -> idle"));
}
