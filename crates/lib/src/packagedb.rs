//! Persistent record of installed modules.
//!
//! The database is a single JSON document in the state directory. Every
//! mutation takes the symlink lock, re-reads the file so writes from other
//! processes are not lost, applies the change, and replaces the file with an
//! atomic, synced write.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{PACKAGEDB_FILENAME, PACKAGEDB_LOCK_FILENAME};
use crate::lock::{LockError, LockWait, SymlinkLock};
use crate::util::fileutils::{atomic_write, filter_files_by_prefix, remove_files_and_dirs};

const DB_VERSION: u32 = 1;

/// One installed module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
  pub revision: String,
  /// Paths relative to the install prefix; `None` for in-place installs
  /// where no manifest could be recorded.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub manifest: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub configure_cmd: Option<String>,
  /// Seconds since the Unix epoch.
  pub installed_at: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DbFile {
  version: u32,
  entries: BTreeMap<String, PackageEntry>,
}

#[derive(Debug, Error)]
pub enum PackageDbError {
  #[error("failed to read package database {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse package database {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported package database version {found} in {path}")]
  Version { path: PathBuf, found: u32 },

  #[error("failed to write package database {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error("module '{0}' is not installed")]
  NotInstalled(String),

  #[error("failed to remove {} installed file(s) of '{name}': {}", failures.len(), failures.join(", "))]
  Uninstall { name: String, failures: Vec<String> },
}

/// Handle on the package database of one install prefix.
#[derive(Debug)]
pub struct PackageDb {
  path: PathBuf,
  lock_path: PathBuf,
  prefix: PathBuf,
  lock_wait: LockWait,
  entries: BTreeMap<String, PackageEntry>,
}

impl PackageDb {
  /// Opens the database stored in `state_dir`. A missing file is an empty database.
  pub fn open(state_dir: &Path, prefix: &Path, lock_wait: LockWait) -> Result<Self, PackageDbError> {
    let mut db = Self {
      path: state_dir.join(PACKAGEDB_FILENAME),
      lock_path: state_dir.join(PACKAGEDB_LOCK_FILENAME),
      prefix: prefix.to_path_buf(),
      lock_wait,
      entries: BTreeMap::new(),
    };
    db.reload()?;
    Ok(db)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn prefix(&self) -> &Path {
    &self.prefix
  }

  pub fn get(&self, name: &str) -> Option<&PackageEntry> {
    self.entries.get(name)
  }

  pub fn entries(&self) -> impl Iterator<Item = (&String, &PackageEntry)> {
    self.entries.iter()
  }

  /// True when `name` is installed at `revision`.
  pub fn check(&self, name: &str, revision: &str) -> bool {
    self.entries.get(name).is_some_and(|e| e.revision == revision)
  }

  pub fn install_date(&self, name: &str) -> Option<u64> {
    self.entries.get(name).map(|e| e.installed_at)
  }

  /// Records a successful install, overwriting any previous entry.
  ///
  /// A `None` manifest keeps whatever manifest was stored before. The entry is
  /// on disk when this returns.
  pub fn add(
    &mut self,
    name: &str,
    revision: &str,
    manifest: Option<Vec<String>>,
    configure_cmd: Option<String>,
  ) -> Result<(), PackageDbError> {
    self.add_at(name, revision, manifest, configure_cmd, unix_now())
  }

  pub(crate) fn add_at(
    &mut self,
    name: &str,
    revision: &str,
    manifest: Option<Vec<String>>,
    configure_cmd: Option<String>,
    installed_at: u64,
  ) -> Result<(), PackageDbError> {
    let _lock = SymlinkLock::acquire(&self.lock_path, self.lock_wait)?;
    self.reload()?;

    let manifest = manifest.or_else(|| self.entries.get(name).and_then(|e| e.manifest.clone()));
    self.entries.insert(
      name.to_string(),
      PackageEntry {
        revision: revision.to_string(),
        manifest,
        configure_cmd,
        installed_at,
      },
    );
    self.save()?;
    debug!(module = %name, revision = %revision, "package database updated");
    Ok(())
  }

  /// Removes `name` and every file of its manifest still under the prefix.
  pub fn uninstall(&mut self, name: &str) -> Result<(), PackageDbError> {
    let _lock = SymlinkLock::acquire(&self.lock_path, self.lock_wait)?;
    self.reload()?;

    let entry = self
      .entries
      .get(name)
      .cloned()
      .ok_or_else(|| PackageDbError::NotInstalled(name.to_string()))?;

    let mut failures = Vec::new();
    match &entry.manifest {
      Some(manifest) => {
        let inside = filter_files_by_prefix(&self.prefix, manifest);
        info!(module = %name, files = inside.len(), "removing installed files");
        failures = remove_files_and_dirs(&self.prefix, &inside)
          .into_iter()
          .map(|f| format!("{}: {}", f.path.display(), f.error))
          .collect();
      }
      None => warn!(module = %name, "no manifest recorded; only the database entry is removed"),
    }

    if !failures.is_empty() {
      return Err(PackageDbError::Uninstall {
        name: name.to_string(),
        failures,
      });
    }

    self.entries.remove(name);
    self.save()
  }

  fn reload(&mut self) -> Result<(), PackageDbError> {
    let data = match std::fs::read(&self.path) {
      Ok(data) => data,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        self.entries.clear();
        return Ok(());
      }
      Err(source) => {
        return Err(PackageDbError::Read {
          path: self.path.clone(),
          source,
        });
      }
    };
    let file: DbFile = serde_json::from_slice(&data).map_err(|source| PackageDbError::Parse {
      path: self.path.clone(),
      source,
    })?;
    if file.version != DB_VERSION {
      return Err(PackageDbError::Version {
        path: self.path.clone(),
        found: file.version,
      });
    }
    self.entries = file.entries;
    Ok(())
  }

  fn save(&self) -> Result<(), PackageDbError> {
    let file = DbFile {
      version: DB_VERSION,
      entries: self.entries.clone(),
    };
    let json = serde_json::to_vec_pretty(&file).map_err(|e| PackageDbError::Write {
      path: self.path.clone(),
      source: io::Error::other(e),
    })?;
    atomic_write(&self.path, &json).map_err(|source| PackageDbError::Write {
      path: self.path.clone(),
      source,
    })
  }
}

pub(crate) fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}
