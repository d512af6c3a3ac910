//! Staged installs.
//!
//! A module installs into `<top_builddir>/root-<name>`. The staged tree under
//! `<destdir><prefix>` is then moved into the prefix, files a previous build
//! installed but this one did not are deleted, and the package database entry
//! is replaced. The database is written only after every move has succeeded,
//! so an entry always describes files that are actually in the prefix.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::build::context::BuildContext;
use crate::config::Config;
use crate::module::Module;
use crate::module::phase::PhaseError;
use crate::packagedb::PackageDbError;
use crate::util::fileutils::{
  accumulate_dirtree_contents, filter_files_by_prefix, rebase_under, remove_files_and_dirs, remove_tree_if_exists,
  rename_to_broken,
};

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("failed to prepare install root {path}: {source}")]
  Prepare {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("install did not create {expected}; staged tree kept at {broken}")]
  MissingRoot { expected: PathBuf, broken: PathBuf },

  #[error("failed to scan staged tree {path}: {source}")]
  Scan {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to move {} path(s) into the prefix: {}", failures.len(), failures.join("; "))]
  Move { failures: Vec<String> },

  #[error("files were installed outside the prefix; kept at {broken}")]
  StrayFiles { broken: PathBuf },

  #[error(transparent)]
  PackageDb(#[from] PackageDbError),
}

/// Outcome of a successful promotion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub manifest: Vec<String>,
  /// Files, symlinks and whole directories moved into the prefix.
  pub moved: usize,
  pub orphans_removed: usize,
  /// Leftover staged tree, when the install wrote outside the prefix.
  pub stray: Option<PathBuf>,
}

/// Staging root of `module`.
pub fn destdir_for(config: &Config, name: &str) -> PathBuf {
  config.top_builddir.join(format!("root-{}", name))
}

/// Recreates the staging root of `module` empty.
pub fn prepare_installroot(module: &Module, config: &Config) -> Result<PathBuf, InstallError> {
  let destdir = destdir_for(config, &module.name);
  let prepare = |source| InstallError::Prepare {
    path: destdir.clone(),
    source,
  };
  remove_tree_if_exists(&destdir).map_err(prepare)?;
  fs::create_dir_all(&destdir).map_err(prepare)?;
  Ok(destdir)
}

/// Runs `run` as the install step of `module` and records the result.
///
/// Modules that support staging get a fresh DESTDIR, passed to `run`, and
/// their output is promoted with [`process_install`]. Other modules install
/// in place; their entry is updated without touching the stored manifest.
pub fn install<F>(module: &Module, ctx: &mut BuildContext, run: F) -> Result<InstallReport, PhaseError>
where
  F: FnOnce(&mut BuildContext, Option<&Path>) -> Result<(), PhaseError>,
{
  if !module.supports_install_destdir() {
    run(ctx, None)?;
    let revision = module.revision().unwrap_or_default();
    let configure_cmd = module.configure_command(ctx.config());
    ctx
      .packagedb
      .add(&module.name, &revision, None, configure_cmd)
      .map_err(InstallError::from)?;
    return Ok(InstallReport::default());
  }

  let destdir = prepare_installroot(module, ctx.config())?;
  if let Err(e) = run(ctx, Some(&destdir)) {
    match rename_to_broken(&destdir) {
      Ok(broken) => warn!(module = %module.name, path = %broken.display(), "install failed, staged tree kept"),
      Err(err) => debug!(module = %module.name, error = %err, "could not keep staged tree"),
    }
    return Err(e);
  }

  let report = process_install(module, ctx, &destdir)?;
  ctx.message(&format!(
    "Installed {} ({} paths, {} orphans removed)",
    module.name,
    report.manifest.len(),
    report.orphans_removed
  ));
  Ok(report)
}

/// Promotes the staged tree in `destdir` into the prefix.
pub fn process_install(module: &Module, ctx: &mut BuildContext, destdir: &Path) -> Result<InstallReport, InstallError> {
  let prefix = ctx.config().prefix.clone();
  let allow_stray = ctx.config().allow_stray_install_files;
  let configure_cmd = module.configure_command(ctx.config());
  let revision = module.revision().unwrap_or_default();

  let staged = rebase_under(destdir, &prefix);
  if !staged.is_dir() {
    let broken = rename_to_broken(destdir).map_err(|source| InstallError::Prepare {
      path: destdir.to_path_buf(),
      source,
    })?;
    return Err(InstallError::MissingRoot {
      expected: staged,
      broken,
    });
  }

  strip_unwanted(&staged)?;

  let manifest = accumulate_dirtree_contents(&staged).map_err(|source| InstallError::Scan {
    path: staged.clone(),
    source,
  })?;

  let mut moved = 0;
  let mut failures = Vec::new();
  fs::create_dir_all(&prefix).map_err(|source| InstallError::Prepare {
    path: prefix.clone(),
    source,
  })?;
  promote(&staged, &prefix, &mut moved, &mut failures);
  if !failures.is_empty() {
    if let Ok(broken) = rename_to_broken(destdir) {
      warn!(module = %module.name, path = %broken.display(), "promotion incomplete, staged tree kept");
    }
    return Err(InstallError::Move { failures });
  }
  debug!(module = %module.name, moved, "promoted staged tree");

  let stray = finish_staging(&staged, destdir)?;
  if let Some(broken) = &stray {
    warn!(
      module = %module.name,
      path = %broken.display(),
      "files installed outside the prefix were left behind"
    );
  }

  let previous = ctx
    .packagedb
    .get(&module.name)
    .and_then(|e| e.manifest.clone())
    .unwrap_or_default();
  let orphans = orphaned(&prefix, &previous, &manifest);
  let orphans_removed = remove_orphans(&module.name, &prefix, &orphans);

  ctx
    .packagedb
    .add(&module.name, &revision, Some(manifest.clone()), configure_cmd)?;
  info!(module = %module.name, files = manifest.len(), "install recorded");

  if let Some(broken) = &stray {
    if !allow_stray {
      return Err(InstallError::StrayFiles { broken: broken.clone() });
    }
  }

  Ok(InstallReport {
    manifest,
    moved,
    orphans_removed,
    stray,
  })
}

/// Drops libtool archives and the Texinfo directory index from a staged tree.
fn strip_unwanted(staged: &Path) -> Result<(), InstallError> {
  let scan = |source| InstallError::Scan {
    path: staged.to_path_buf(),
    source,
  };

  let mut unwanted = Vec::new();
  for entry in WalkDir::new(staged).follow_links(false) {
    let entry = entry.map_err(|e| scan(io::Error::other(e)))?;
    if !entry.file_type().is_dir() && entry.path().extension().is_some_and(|ext| ext == "la") {
      unwanted.push(entry.into_path());
    }
  }
  let info_dir = staged.join("share").join("info").join("dir");
  if fs::symlink_metadata(&info_dir).is_ok_and(|m| !m.is_dir()) {
    unwanted.push(info_dir);
  }

  for path in unwanted {
    debug!(path = %path.display(), "removing from staged tree");
    fs::remove_file(&path).map_err(scan)?;
  }
  Ok(())
}

/// Moves everything below `src` into `dest`, descending into directories
/// that already exist there.
fn promote(src: &Path, dest: &Path, moved: &mut usize, failures: &mut Vec<String>) {
  let mut entries = match fs::read_dir(src) {
    Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect::<Vec<_>>(),
    Err(e) => {
      failures.push(format!("{}: {}", src.display(), e));
      return;
    }
  };
  entries.sort();

  for source in entries {
    let Some(name) = source.file_name() else {
      continue;
    };
    let target = dest.join(name);
    let result = match fs::symlink_metadata(&source) {
      Ok(meta) if meta.file_type().is_symlink() => move_symlink(&source, &target),
      Ok(meta) if meta.is_dir() => match fs::symlink_metadata(&target) {
        Ok(existing) if existing.is_dir() => {
          promote(&source, &target, moved, failures);
          // Non-empty only when something below failed to move.
          let _ = fs::remove_dir(&source);
          continue;
        }
        Ok(_) => Err(io::Error::new(
          io::ErrorKind::AlreadyExists,
          "a non-directory is in the way",
        )),
        Err(_) => move_path(&source, &target),
      },
      Ok(_) => match fs::symlink_metadata(&target) {
        Ok(existing) if existing.is_dir() => {
          Err(io::Error::new(io::ErrorKind::AlreadyExists, "a directory is in the way"))
        }
        _ => move_path(&source, &target),
      },
      Err(e) => Err(e),
    };

    match result {
      Ok(()) => *moved += 1,
      Err(e) => failures.push(format!("{}: {}", target.display(), e)),
    }
  }
}

fn move_path(source: &Path, target: &Path) -> io::Result<()> {
  match fs::rename(source, target) {
    Err(e) if e.kind() == io::ErrorKind::CrossesDevices => copy_then_remove(source, target),
    other => other,
  }
}

/// Moves `source` to `target` by copying, for when a rename cannot cross
/// filesystems. Directories are copied recursively with their symlinks
/// recreated; the source is removed only once the whole copy succeeded.
fn copy_then_remove(source: &Path, target: &Path) -> io::Result<()> {
  if !fs::symlink_metadata(source)?.is_dir() {
    copy_entry(source, target)?;
    return fs::remove_file(source);
  }

  for entry in WalkDir::new(source).follow_links(false) {
    let entry = entry.map_err(io::Error::from)?;
    let relative = entry.path().strip_prefix(source).map_err(io::Error::other)?;
    let dest = target.join(relative);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&dest)?;
    } else {
      copy_entry(entry.path(), &dest)?;
    }
  }
  debug!(source = %source.display(), target = %target.display(), "copied across filesystems");
  fs::remove_dir_all(source)
}

fn copy_entry(source: &Path, target: &Path) -> io::Result<()> {
  #[cfg(unix)]
  if fs::symlink_metadata(source)?.file_type().is_symlink() {
    return std::os::unix::fs::symlink(fs::read_link(source)?, target);
  }
  fs::copy(source, target).map(|_| ())
}

#[cfg(unix)]
fn move_symlink(source: &Path, target: &Path) -> io::Result<()> {
  let link = fs::read_link(source)?;
  match fs::symlink_metadata(target) {
    Ok(meta) if meta.is_dir() => {
      return Err(io::Error::new(io::ErrorKind::AlreadyExists, "a directory is in the way"));
    }
    Ok(_) => fs::remove_file(target)?,
    Err(_) => {}
  }
  std::os::unix::fs::symlink(link, target)?;
  fs::remove_file(source)
}

#[cfg(not(unix))]
fn move_symlink(source: &Path, target: &Path) -> io::Result<()> {
  move_path(source, target)
}

/// Removes the emptied staging directories. Returns the kept tree when
/// anything is left over.
fn finish_staging(staged: &Path, destdir: &Path) -> Result<Option<PathBuf>, InstallError> {
  let _ = fs::remove_dir(staged);
  for dir in staged.ancestors().skip(1) {
    if !dir.starts_with(destdir) {
      break;
    }
    if fs::remove_dir(dir).is_err() {
      break;
    }
  }

  if fs::symlink_metadata(destdir).is_err() {
    return Ok(None);
  }
  let broken = rename_to_broken(destdir).map_err(|source| InstallError::Prepare {
    path: destdir.to_path_buf(),
    source,
  })?;
  Ok(Some(broken))
}

/// Entries of `previous` inside `prefix` that `current` no longer lists.
fn orphaned(prefix: &Path, previous: &[String], current: &[String]) -> Vec<String> {
  let current: BTreeSet<&str> = current.iter().map(|p| p.trim_end_matches('/')).collect();
  filter_files_by_prefix(prefix, previous)
    .into_iter()
    .filter(|p| !current.contains(p.trim_end_matches('/')))
    .collect()
}

fn remove_orphans(module: &str, prefix: &Path, orphans: &[String]) -> usize {
  if orphans.is_empty() {
    return 0;
  }
  let failures = remove_files_and_dirs(prefix, orphans);
  for failure in &failures {
    warn!(module = %module, path = %failure.path.display(), error = %failure.error, "could not remove orphaned file");
  }
  info!(module = %module, count = orphans.len() - failures.len(), "removed orphaned files");
  orphans.len() - failures.len()
}
