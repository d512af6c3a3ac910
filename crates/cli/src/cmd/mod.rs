//! Subcommand implementations and the setup they share.

mod build;
mod dot;
mod info;
mod list;
mod sysdeps;
mod uninstall;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::debug;

use modbuild_lib::config::Config;
use modbuild_lib::lock::LockWait;
use modbuild_lib::module::registry::TypeRegistry;
use modbuild_lib::moduleset::{ModuleSet, ModuleSetLoader, SelectOptions};
use modbuild_lib::packagedb::PackageDb;
use modbuild_lib::platform::paths;

pub use build::{BuildArgs, cmd_build};
pub use dot::cmd_dot;
pub use info::cmd_info;
pub use list::cmd_list;
pub use sysdeps::cmd_sysdeps;
pub use uninstall::cmd_uninstall;

/// Options every subcommand accepts.
#[derive(Debug, Default)]
pub struct GlobalArgs {
  pub config: Option<PathBuf>,
  pub moduleset: Option<PathBuf>,
}

/// Reads the configuration file; a missing default file means defaults.
pub fn load_config(global: &GlobalArgs) -> Result<Config> {
  match &global.config {
    Some(path) => Config::load(path).with_context(|| format!("Failed to load config {}", path.display())),
    None => {
      let path = paths::config_file();
      debug!(path = %path.display(), "loading config");
      Config::load_or_default(&path).with_context(|| format!("Failed to load config {}", path.display()))
    }
  }
}

/// Loads the moduleset named on the command line or in the configuration.
pub fn load_moduleset(global: &GlobalArgs, config: &Config) -> Result<ModuleSet> {
  let Some(path) = global.moduleset.as_ref().or(config.moduleset.as_ref()) else {
    bail!("No moduleset given. Pass --moduleset or set 'moduleset' in the config file.");
  };
  let registry = TypeRegistry::with_builtins();
  ModuleSetLoader::new(&registry, config)
    .load(path)
    .with_context(|| format!("Failed to load moduleset {}", path.display()))
}

pub fn open_packagedb(config: &Config) -> Result<PackageDb> {
  PackageDb::open(
    &config.state_dir,
    &config.prefix,
    LockWait::from_secs(config.lock_timeout_secs),
  )
  .context("Failed to open package database")
}

/// Names of `seeds` and their dependencies in build order, or every module
/// when `seeds` is empty.
pub fn select<'a>(
  moduleset: &'a ModuleSet,
  seeds: &[String],
  options: &SelectOptions,
) -> Result<Vec<&'a modbuild_lib::module::Module>> {
  if seeds.is_empty() {
    return Ok(moduleset.get_full_module_list(&options.skip));
  }
  Ok(moduleset.get_module_list(seeds, options)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  #[test]
  #[serial]
  fn config_file_comes_from_environment() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("custom.toml");
    std::fs::write(&path, "jobs = 7\n").unwrap();

    let config = temp_env::with_var("MODBUILD_CONFIG", Some(&path), || load_config(&GlobalArgs::default())).unwrap();

    assert_eq!(config.jobs, 7);
  }

  #[test]
  #[serial]
  fn missing_default_config_means_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("absent.toml");

    let config = temp_env::with_var("MODBUILD_CONFIG", Some(&path), || load_config(&GlobalArgs::default())).unwrap();

    assert_eq!(config.jobs, Config::default().jobs);
  }

  #[test]
  fn explicit_config_must_exist() {
    let temp = TempDir::new().unwrap();
    let global = GlobalArgs {
      config: Some(temp.path().join("absent.toml")),
      moduleset: None,
    };

    assert!(load_config(&global).is_err());
  }

  #[test]
  fn command_line_moduleset_wins() {
    let temp = TempDir::new().unwrap();
    let modules = temp.path().join("cli.modules");
    std::fs::write(&modules, r#"<moduleset><metamodule id="from-cli"/></moduleset>"#).unwrap();
    let config = Config {
      moduleset: Some(temp.path().join("absent.modules")),
      ..Config::default()
    };
    let global = GlobalArgs {
      config: None,
      moduleset: Some(modules),
    };

    let moduleset = load_moduleset(&global, &config).unwrap();

    assert!(moduleset.get("from-cli").is_some());
  }
}
