use crate::consts::{APP_NAME, CONFIG_FILE_ENV, STATE_DIR_ENV};
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/"))
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the configuration file path, honouring `MODBUILD_CONFIG`.
pub fn config_file() -> PathBuf {
  if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
    return PathBuf::from(path);
  }
  config_dir().join("config.toml")
}

/// Returns the per-user state directory holding the package database and its lock.
#[cfg(windows)]
pub fn state_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
    return PathBuf::from(dir);
  }
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the per-user state directory holding the package database and its lock.
#[cfg(not(windows))]
pub fn state_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
    return PathBuf::from(dir);
  }
  let state_home = std::env::var("XDG_STATE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("state"));
  state_home.join(APP_NAME)
}
