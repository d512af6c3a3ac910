//! Build configuration.
//!
//! Every option has a default, so an empty file (or no file at all) is a
//! valid configuration. Paths left unset are derived from the state directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::paths::state_dir;

/// Rule deciding whether an already-installed module is rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildPolicy {
  /// Rebuild everything.
  #[default]
  All,
  /// Skip modules whose installed revision matches the checkout.
  Updated,
  /// Like `Updated`, but also rebuild when any dependency was installed later.
  UpdatedDeps,
}

impl std::fmt::Display for BuildPolicy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      BuildPolicy::All => "all",
      BuildPolicy::Updated => "updated",
      BuildPolicy::UpdatedDeps => "updated-deps",
    })
  }
}

impl std::str::FromStr for BuildPolicy {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "all" => Ok(BuildPolicy::All),
      "updated" => Ok(BuildPolicy::Updated),
      "updated-deps" => Ok(BuildPolicy::UpdatedDeps),
      other => Err(ConfigError::InvalidPolicy(other.to_string())),
    }
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("unknown build policy '{0}', expected all, updated or updated-deps")]
  InvalidPolicy(String),
}

/// Read-only view of the options a build consults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Install root shared by all modules.
  pub prefix: PathBuf,
  /// Root of source checkouts and downloaded archives.
  pub checkoutroot: PathBuf,
  /// Where staging roots (`root-<module>`) are created.
  pub top_builddir: PathBuf,
  /// Optional root for out-of-tree build directories.
  pub buildroot: Option<PathBuf>,
  /// Build directory name pattern; `%s` is replaced by the source directory name.
  pub builddir_pattern: String,
  pub jobs: u32,
  pub makeargs: String,
  pub ninjaargs: String,
  pub mesonargs: String,
  pub autogenargs: String,
  pub module_makeargs: BTreeMap<String, String>,
  pub module_ninjaargs: BTreeMap<String, String>,
  pub module_mesonargs: BTreeMap<String, String>,
  pub module_autogenargs: BTreeMap<String, String>,
  pub module_extra_env: BTreeMap<String, BTreeMap<String, String>>,
  pub module_makecheck: BTreeMap<String, bool>,
  pub module_mirror_policy: BTreeMap<String, String>,
  pub nobuild: bool,
  pub noinstall: bool,
  pub nonetwork: bool,
  pub alwaysautogen: bool,
  pub makeclean: bool,
  pub makecheck_advisory: bool,
  pub makedistcheck: bool,
  pub build_policy: BuildPolicy,
  /// Optional phases to run, e.g. `check` or `dist`.
  pub build_targets: Vec<String>,
  pub use_lib64: bool,
  pub interact: bool,
  /// Seconds to wait for the package database lock; 0 waits forever.
  pub lock_timeout_secs: i64,
  /// Count an install as successful even when files land outside the prefix.
  pub allow_stray_install_files: bool,
  /// Directory holding the package database and its lock.
  pub state_dir: PathBuf,
  /// Moduleset file to load when none is given on the command line.
  pub moduleset: Option<PathBuf>,
  /// Modules to build when none are given on the command line.
  pub modules: Vec<String>,
  pub skip: Vec<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self::with_state_dir(state_dir())
  }
}

impl Config {
  /// Default configuration rooted at `state`.
  pub fn with_state_dir(state: PathBuf) -> Self {
    Self {
      prefix: state.join("install"),
      checkoutroot: state.join("checkout"),
      top_builddir: state.join("_build"),
      buildroot: None,
      builddir_pattern: "%s".to_string(),
      jobs: std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1),
      makeargs: String::new(),
      ninjaargs: String::new(),
      mesonargs: String::new(),
      autogenargs: String::new(),
      module_makeargs: BTreeMap::new(),
      module_ninjaargs: BTreeMap::new(),
      module_mesonargs: BTreeMap::new(),
      module_autogenargs: BTreeMap::new(),
      module_extra_env: BTreeMap::new(),
      module_makecheck: BTreeMap::new(),
      module_mirror_policy: BTreeMap::new(),
      nobuild: false,
      noinstall: false,
      nonetwork: false,
      alwaysautogen: false,
      makeclean: false,
      makecheck_advisory: false,
      makedistcheck: false,
      build_policy: BuildPolicy::All,
      build_targets: vec!["install".to_string()],
      use_lib64: false,
      interact: false,
      lock_timeout_secs: 0,
      allow_stray_install_files: false,
      state_dir: state,
      moduleset: None,
      modules: Vec::new(),
      skip: Vec::new(),
    }
  }

  /// Loads `path`. Paths in the file that are unset fall back to the state directory.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml(&text).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Loads `path` if it exists, else returns the defaults.
  pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
    if path.exists() { Self::load(path) } else { Ok(Self::default()) }
  }

  pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
    // Derived paths follow `state_dir` when the file moves it without setting them.
    let raw: toml::Table = toml::from_str(text)?;
    let mut config: Config = toml::Value::Table(raw.clone()).try_into()?;
    if raw.contains_key("state_dir") {
      let derived = Self::with_state_dir(config.state_dir.clone());
      if !raw.contains_key("prefix") {
        config.prefix = derived.prefix;
      }
      if !raw.contains_key("checkoutroot") {
        config.checkoutroot = derived.checkoutroot;
      }
      if !raw.contains_key("top_builddir") {
        config.top_builddir = derived.top_builddir;
      }
    }
    Ok(config)
  }

  /// `lib64` when `use_lib64` is set, else `lib`.
  pub fn libdir_name(&self) -> &'static str {
    if self.use_lib64 { "lib64" } else { "lib" }
  }

  /// Whether the optional `target` phase (e.g. `check`) was requested.
  pub fn wants_target(&self, target: &str) -> bool {
    self.build_targets.iter().any(|t| t == target)
  }

  /// Extra environment configured for `module`.
  pub fn extra_env_for(&self, module: &str) -> Vec<(String, String)> {
    self
      .module_extra_env
      .get(module)
      .map(|env| env.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
      .unwrap_or_default()
  }
}
