//! Filesystem helpers shared by the install engine and the package database.
//!
//! Manifests are lists of `/`-separated paths relative to the install prefix.
//! An entry ending in `/` names a directory that was empty when recorded; a
//! non-empty directory is implied by the files beneath it.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::consts::BROKEN_SUFFIX;

/// Lists every file, symlink, and empty directory below `root`.
///
/// Entries are relative to `root`, joined with `/`, and sorted. Empty
/// directories carry a trailing `/`.
pub fn accumulate_dirtree_contents(root: &Path) -> io::Result<Vec<String>> {
  let mut contents = Vec::new();

  for entry in WalkDir::new(root).min_depth(1).follow_links(false).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    let Ok(rel) = entry.path().strip_prefix(root) else {
      continue;
    };
    let rel = manifest_path(rel);

    if entry.file_type().is_dir() {
      if fs::read_dir(entry.path())?.next().is_none() {
        contents.push(format!("{}/", rel));
      }
    } else {
      contents.push(rel);
    }
  }

  contents.sort();
  Ok(contents)
}

/// Renders a relative path as a manifest entry.
fn manifest_path(rel: &Path) -> String {
  rel
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect::<Vec<_>>()
    .join("/")
}

/// A path that could not be removed by [`remove_files_and_dirs`].
#[derive(Debug)]
pub struct RemovalFailure {
  pub path: PathBuf,
  pub error: io::Error,
}

/// Deletes manifest entries below `root`, deepest first.
///
/// Entries are processed in reverse lexicographic order so files go before
/// their directories. Directories are only removed when empty; a non-empty
/// directory and an already-missing path are not failures.
pub fn remove_files_and_dirs(root: &Path, entries: &[String]) -> Vec<RemovalFailure> {
  let mut sorted: Vec<&String> = entries.iter().collect();
  sorted.sort();
  sorted.dedup();

  let mut failures = Vec::new();
  for entry in sorted.into_iter().rev() {
    let path = root.join(entry.trim_end_matches('/'));
    let meta = match fs::symlink_metadata(&path) {
      Ok(meta) => meta,
      Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
      Err(error) => {
        failures.push(RemovalFailure { path, error });
        continue;
      }
    };

    let result = if meta.is_dir() {
      fs::remove_dir(&path)
    } else {
      fs::remove_file(&path)
    };

    match result {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) if meta.is_dir() && e.kind() == io::ErrorKind::DirectoryNotEmpty => {}
      Err(error) => failures.push(RemovalFailure { path, error }),
    }
  }
  failures
}

/// Keeps the manifest entries that resolve inside `prefix`.
///
/// Relative entries are kept unless they climb out with `..`. Absolute
/// entries are rewritten relative to `prefix` when they lie beneath it and
/// dropped otherwise. The prefix itself is never returned.
pub fn filter_files_by_prefix(prefix: &Path, entries: &[String]) -> Vec<String> {
  entries
    .iter()
    .filter_map(|entry| {
      let path = Path::new(entry);
      let rel = if path.is_absolute() {
        let rel = path.strip_prefix(prefix).ok()?;
        let mut rel = manifest_path(rel);
        if entry.ends_with('/') && !rel.is_empty() {
          rel.push('/');
        }
        rel
      } else {
        entry.clone()
      };

      let trimmed = rel.trim_end_matches('/');
      if trimmed.is_empty() {
        return None;
      }
      let escapes = Path::new(trimmed)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
      if escapes { None } else { Some(rel) }
    })
    .collect()
}

/// Writes `contents` to `path` so a crash leaves either the old or the new file.
///
/// The data is written to a temporary file in the same directory, synced to
/// disk, then renamed over `path`. The parent directory is synced afterwards
/// on Unix so the rename itself is durable.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
  let parent = match path.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  fs::create_dir_all(parent)?;

  let mut tmp = NamedTempFile::new_in(parent)?;
  tmp.write_all(contents)?;
  tmp.as_file().sync_all()?;
  tmp.persist(path).map_err(|e| e.error)?;

  #[cfg(unix)]
  fs::File::open(parent)?.sync_all()?;

  Ok(())
}

/// Returns `<prefix>` re-rooted under `destdir`, e.g. `/dest` + `/opt/x` gives `/dest/opt/x`.
pub fn rebase_under(destdir: &Path, prefix: &Path) -> PathBuf {
  let mut out = destdir.to_path_buf();
  for component in prefix.components() {
    if let Component::Normal(part) = component {
      out.push(part);
    }
  }
  out
}

/// Path used to keep a failed staging root around for inspection.
pub fn broken_path(path: &Path) -> PathBuf {
  let mut name = path.as_os_str().to_os_string();
  name.push(BROKEN_SUFFIX);
  PathBuf::from(name)
}

/// Renames `path` to `<path>-broken`, replacing any previous broken tree.
pub fn rename_to_broken(path: &Path) -> io::Result<PathBuf> {
  let broken = broken_path(path);
  if fs::symlink_metadata(&broken).is_ok() {
    fs::remove_dir_all(&broken)?;
  }
  fs::rename(path, &broken)?;
  Ok(broken)
}

/// Removes `path` recursively when it exists.
pub fn remove_tree_if_exists(path: &Path) -> io::Result<()> {
  match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}
