//! CLI smoke tests for modbuild.
//!
//! These tests verify that every command parses, runs without panicking and
//! reports failures through its exit code.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn modbuild_cmd() -> Command {
  cargo_bin_cmd!("modbuild")
}

/// A config file and moduleset inside a fresh temp directory.
fn temp_setup(moduleset: &str) -> TempDir {
  let temp = TempDir::new().unwrap();
  let state = temp.path().join("state");
  let modules = temp.path().join("test.modules");
  std::fs::write(&modules, moduleset).unwrap();
  std::fs::write(
    temp.path().join("config.toml"),
    format!(
      "state_dir = {:?}\nmoduleset = {:?}\n",
      state.display().to_string(),
      modules.display().to_string()
    ),
  )
  .unwrap();
  temp
}

const GROUPS: &str = r#"
<moduleset>
  <metamodule id="desktop">
    <dependencies><dep package="base"/></dependencies>
  </metamodule>
  <metamodule id="base"/>
</moduleset>
"#;

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  modbuild_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  modbuild_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("modbuild"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["build", "list", "info", "uninstall", "dot", "sysdeps"] {
    modbuild_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn unknown_policy_is_rejected() {
  modbuild_cmd()
    .args(["build", "--policy", "sometimes"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("sometimes"));
}

// =============================================================================
// Moduleset commands
// =============================================================================

#[test]
fn missing_moduleset_is_an_error() {
  let temp = TempDir::new().unwrap();
  let config = temp.path().join("config.toml");
  std::fs::write(&config, "").unwrap();

  modbuild_cmd()
    .arg("--config")
    .arg(&config)
    .arg("list")
    .assert()
    .failure()
    .stderr(predicate::str::contains("No moduleset given"));
}

#[test]
fn dry_run_prints_build_order() {
  let temp = temp_setup(GROUPS);

  modbuild_cmd()
    .arg("--config")
    .arg(temp.path().join("config.toml"))
    .args(["build", "--dry-run", "desktop"])
    .assert()
    .success()
    .stdout(predicate::str::is_match(r"(?s)1\. base \(metamodule\).*2\. desktop \(metamodule\)").unwrap());
}

#[test]
fn list_reports_install_state() {
  let temp = temp_setup(GROUPS);

  modbuild_cmd()
    .arg("--config")
    .arg(temp.path().join("config.toml"))
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("base (not installed)"));
}

#[test]
fn list_json_is_parseable() {
  let temp = temp_setup(GROUPS);

  let output = modbuild_cmd()
    .arg("--config")
    .arg(temp.path().join("config.toml"))
    .args(["list", "--format", "json"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let items: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(items[0]["name"], "base");
  assert_eq!(items[1]["name"], "desktop");
}

#[test]
fn info_shows_graph_edges() {
  let temp = temp_setup(GROUPS);

  modbuild_cmd()
    .arg("--config")
    .arg(temp.path().join("config.toml"))
    .args(["info", "base"])
    .assert()
    .success()
    .stdout(predicate::str::contains("metamodule"))
    .stdout(predicate::str::contains("desktop"));
}

#[test]
fn info_unknown_module_fails() {
  let temp = temp_setup(GROUPS);

  modbuild_cmd()
    .arg("--config")
    .arg(temp.path().join("config.toml"))
    .args(["info", "nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("'nope' not found"));
}

#[test]
fn dot_prints_a_digraph() {
  let temp = temp_setup(GROUPS);

  modbuild_cmd()
    .arg("--config")
    .arg(temp.path().join("config.toml"))
    .arg("dot")
    .assert()
    .success()
    .stdout(predicate::str::starts_with("digraph"))
    .stdout(predicate::str::contains("\"desktop\" -> \"base\""));
}

#[test]
fn cycle_fails_before_building() {
  let temp = temp_setup(
    r#"<moduleset>
         <metamodule id="a"><dependencies><dep package="b"/></dependencies></metamodule>
         <metamodule id="b"><dependencies><dep package="a"/></dependencies></metamodule>
       </moduleset>"#,
  );

  modbuild_cmd()
    .arg("--config")
    .arg(temp.path().join("config.toml"))
    .args(["build", "a"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle"));
}

#[test]
fn uninstall_of_unknown_module_fails() {
  let temp = temp_setup(GROUPS);

  modbuild_cmd()
    .arg("--config")
    .arg(temp.path().join("config.toml"))
    .args(["uninstall", "--force", "base"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Not installed: base"));
}
