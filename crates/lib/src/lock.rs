//! Symlink-based lock guarding the package database.
//!
//! Acquiring the lock atomically creates a symbolic link whose target is
//! `lock-pid-<pid>-uid-<uid>`. The link carries no data beyond its target, so
//! a waiting process can always tell who holds the lock. A link left behind
//! by a process that no longer exists (or now belongs to another user) is
//! stale and is reclaimed.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform::process::{current_uid, process_matches};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long [`SymlinkLock::acquire`] waits for a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
  /// Block until the holder releases the lock.
  Forever,
  /// Fail immediately if the lock is held.
  NoWait,
  /// Give up after the duration elapses.
  Timeout(Duration),
}

impl LockWait {
  /// Interprets a configured timeout: `0` waits forever, a negative value
  /// does not wait, anything else is a limit in seconds.
  pub fn from_secs(secs: i64) -> Self {
    match secs {
      0 => LockWait::Forever,
      s if s < 0 => LockWait::NoWait,
      s => LockWait::Timeout(Duration::from_secs(s.unsigned_abs())),
    }
  }
}

/// Identity recorded in the lock link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHolder {
  pub pid: u32,
  pub uid: u32,
}

impl LockHolder {
  pub fn current() -> Self {
    Self {
      pid: std::process::id(),
      uid: current_uid(),
    }
  }

  fn parse(target: &str) -> Option<Self> {
    let rest = target.strip_prefix("lock-pid-")?;
    let (pid, uid) = rest.split_once("-uid-")?;
    if pid.is_empty() || uid.is_empty() || !pid.chars().chain(uid.chars()).all(|c| c.is_ascii_digit()) {
      return None;
    }
    Some(Self {
      pid: pid.parse().ok()?,
      uid: uid.parse().ok()?,
    })
  }
}

impl std::fmt::Display for LockHolder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "lock-pid-{}-uid-{}", self.pid, self.uid)
  }
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error("timed out waiting for lock file {path} held by pid {pid}")]
  Timeout { path: PathBuf, pid: u32 },

  #[error("invalid lock data {data:?} in {path}, expected lock-pid-XXX-uid-XXX")]
  InvalidData { path: PathBuf, data: String },

  #[error("failed to create lock directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create lock {path}: {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read lock {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove lock {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A held lock. Dropping it removes the link.
#[derive(Debug)]
pub struct SymlinkLock {
  path: PathBuf,
  released: bool,
}

impl SymlinkLock {
  /// Acquires the lock at `path`, waiting according to `wait`.
  pub fn acquire(path: &Path, wait: LockWait) -> Result<Self, LockError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|source| LockError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let me = LockHolder::current().to_string();
    let started = Instant::now();
    let mut announced = false;

    loop {
      match create_link(&me, path) {
        Ok(()) => {
          debug!(path = %path.display(), "lock acquired");
          return Ok(Self {
            path: path.to_path_buf(),
            released: false,
          });
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(source) => {
          return Err(LockError::Create {
            path: path.to_path_buf(),
            source,
          });
        }
      }

      let Some(holder) = read_holder(path)? else {
        // Released between our attempt and the read.
        continue;
      };

      if !process_matches(holder.pid, holder.uid) {
        info!(
          pid = holder.pid,
          uid = holder.uid,
          "removing stale lock left by no longer extant process"
        );
        match std::fs::remove_file(path) {
          Ok(()) => continue,
          Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
          Err(source) => {
            return Err(LockError::Remove {
              path: path.to_path_buf(),
              source,
            });
          }
        }
      }

      let expired = match wait {
        LockWait::Forever => false,
        LockWait::NoWait => true,
        LockWait::Timeout(limit) => started.elapsed() >= limit,
      };
      if expired {
        return Err(LockError::Timeout {
          path: path.to_path_buf(),
          pid: holder.pid,
        });
      }

      if !announced {
        info!(
          path = %path.display(),
          pid = holder.pid,
          "lock taken by another process; waiting for it to exit"
        );
        announced = true;
      }
      std::thread::sleep(POLL_INTERVAL);
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Releases the lock, reporting failures that `Drop` would swallow.
  pub fn release(mut self) -> Result<(), LockError> {
    self.released = true;
    std::fs::remove_file(&self.path).map_err(|source| LockError::Remove {
      path: self.path.clone(),
      source,
    })
  }
}

impl Drop for SymlinkLock {
  fn drop(&mut self) {
    if self.released {
      return;
    }
    if let Err(e) = std::fs::remove_file(&self.path) {
      warn!(path = %self.path.display(), error = %e, "failed to release lock");
    }
  }
}

#[cfg(unix)]
fn create_link(target: &str, path: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
fn create_link(target: &str, path: &Path) -> io::Result<()> {
  use std::io::Write;
  let mut file = std::fs::OpenOptions::new().write(true).create_new(true).open(path)?;
  file.write_all(target.as_bytes())
}

#[cfg(unix)]
fn read_target(path: &Path) -> io::Result<String> {
  std::fs::read_link(path).map(|t| t.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn read_target(path: &Path) -> io::Result<String> {
  std::fs::read_to_string(path)
}

/// Reads the current holder, or `None` if the lock vanished.
fn read_holder(path: &Path) -> Result<Option<LockHolder>, LockError> {
  let data = match read_target(path) {
    Ok(data) => data,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(LockError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };
  LockHolder::parse(&data)
    .map(Some)
    .ok_or_else(|| LockError::InvalidData {
      path: path.to_path_buf(),
      data,
    })
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;
  use std::sync::mpsc;
  use tempfile::TempDir;

  #[test]
  fn acquire_creates_link_naming_this_process() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db.lock");

    let lock = SymlinkLock::acquire(&path, LockWait::NoWait).unwrap();

    let target = std::fs::read_link(&path).unwrap();
    assert_eq!(target.to_string_lossy(), LockHolder::current().to_string());
    drop(lock);
    assert!(std::fs::symlink_metadata(&path).is_err());
  }

  #[test]
  fn held_lock_times_out_without_wait() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db.lock");
    let _held = SymlinkLock::acquire(&path, LockWait::NoWait).unwrap();

    let err = SymlinkLock::acquire(&path, LockWait::NoWait).unwrap_err();
    assert!(matches!(err, LockError::Timeout { pid, .. } if pid == std::process::id()));
  }

  #[test]
  fn stale_lock_is_reclaimed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db.lock");

    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead = child.id();
    child.wait().unwrap();
    std::os::unix::fs::symlink(format!("lock-pid-{}-uid-{}", dead, current_uid()), &path).unwrap();

    let lock = SymlinkLock::acquire(&path, LockWait::NoWait).unwrap();
    lock.release().unwrap();
  }

  #[test]
  fn invalid_lock_data_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db.lock");
    std::os::unix::fs::symlink("garbage", &path).unwrap();

    let err = SymlinkLock::acquire(&path, LockWait::NoWait).unwrap_err();
    assert!(matches!(err, LockError::InvalidData { .. }));
  }

  #[test]
  fn waiter_proceeds_after_release() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db.lock");
    let held = SymlinkLock::acquire(&path, LockWait::NoWait).unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter_path = path.clone();
    let waiter = std::thread::spawn(move || {
      let lock = SymlinkLock::acquire(&waiter_path, LockWait::Timeout(Duration::from_secs(10))).unwrap();
      tx.send(()).unwrap();
      drop(lock);
    });

    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err(), "waiter must block");
    held.release().unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    waiter.join().unwrap();
  }

  #[test]
  fn lock_wait_from_secs() {
    assert_eq!(LockWait::from_secs(0), LockWait::Forever);
    assert_eq!(LockWait::from_secs(-1), LockWait::NoWait);
    assert_eq!(LockWait::from_secs(5), LockWait::Timeout(Duration::from_secs(5)));
  }

  #[test]
  fn holder_parse_round_trips() {
    let holder = LockHolder { pid: 42, uid: 1000 };
    assert_eq!(LockHolder::parse(&holder.to_string()), Some(holder));
    assert_eq!(LockHolder::parse("lock-pid--uid-1"), None);
  }
}
