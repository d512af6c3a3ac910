//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own state directory, prefix, checkout root and
/// moduleset inside a temporary directory.
pub struct TestEnv {
  pub temp: TempDir,
  state: &'static str,
}

impl TestEnv {
  pub fn new(moduleset: &str) -> Self {
    Self::with_state_dir(moduleset, "state")
  }

  /// Like [`TestEnv::new`] with the state directory at `state` under the root.
  pub fn with_state_dir(moduleset: &str, state: &'static str) -> Self {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    let env = Self { temp, state };
    env.write_file("test.modules", moduleset);
    env.write_file(
      "config.toml",
      &format!(
        "state_dir = {:?}\nmoduleset = {:?}\njobs = 1\n",
        root.join(state).display().to_string(),
        root.join("test.modules").display().to_string()
      ),
    );
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  pub fn prefix_path(&self, relative: &str) -> PathBuf {
    self.root().join(self.state).join("install").join(relative)
  }

  pub fn checkout_path(&self, relative: &str) -> PathBuf {
    self.root().join(self.state).join("checkout").join(relative)
  }

  /// A `modbuild` command using this environment's config.
  pub fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("modbuild");
    cmd.arg("--config").arg(self.root().join("config.toml"));
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
