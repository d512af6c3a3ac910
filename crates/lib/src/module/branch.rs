//! Version-control handles.
//!
//! The build engine only needs a small surface from a checkout: where the
//! tree lives, how to bring it up to date, and an opaque revision string.
//! Fetching itself belongs to a [`BranchFactory`] supplied by the front-end;
//! the built-in [`LocalBranch`] works on trees that already exist on disk.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::build::context::BuildContext;
use crate::config::Config;
use crate::descriptor::Element;
use crate::module::phase::PhaseError;

/// A `<repository>` declared by a moduleset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
  pub name: String,
  /// Repository type, e.g. `git` or `tarball`.
  pub kind: String,
  pub href: Option<String>,
  pub default: bool,
}

impl Repository {
  pub fn to_element(&self) -> Element {
    let mut element = Element::new("repository")
      .with_attr("type", self.kind.as_str())
      .with_attr("name", self.name.as_str());
    if let Some(href) = &self.href {
      element.set_attr("href", href.as_str());
    }
    if self.default {
      element.set_attr("default", "yes");
    }
    element
  }
}

pub trait Branch: fmt::Debug + Send + Sync {
  /// Directory holding the working tree.
  fn srcdir(&self) -> &Path;

  /// Brings the working tree to the wanted revision.
  fn checkout(&self, ctx: &mut BuildContext) -> Result<(), PhaseError>;

  /// Discards the working tree and checks it out again.
  fn force_checkout(&self, ctx: &mut BuildContext) -> Result<(), PhaseError>;

  /// Whether a checkout may run now.
  fn may_checkout(&self, config: &Config) -> bool {
    !config.nonetwork
  }

  /// Opaque identifier of the checked-out revision.
  fn tree_id(&self) -> Option<String>;

  /// Local modifications suppress the "already built" short-circuit.
  fn is_dirty(&self) -> bool {
    false
  }

  /// Name used for derived build directories.
  fn checkout_name(&self) -> String {
    self
      .srcdir()
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }

  /// The `<branch>` element describing this handle.
  fn to_element(&self) -> Element;
}

/// Creates branch handles for `<branch>` elements.
pub trait BranchFactory: Send + Sync {
  fn create(
    &self,
    repository: &Repository,
    element: Option<&Element>,
    module: &str,
    config: &Config,
  ) -> Result<Box<dyn Branch>, String>;
}

/// Produces a [`LocalBranch`] for every repository type.
#[derive(Debug, Default)]
pub struct LocalBranchFactory;

impl BranchFactory for LocalBranchFactory {
  fn create(
    &self,
    repository: &Repository,
    element: Option<&Element>,
    module: &str,
    config: &Config,
  ) -> Result<Box<dyn Branch>, String> {
    Ok(Box::new(LocalBranch::from_element(repository, element, module, config)))
  }
}

/// A working tree under the checkout root that is populated out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBranch {
  pub repo: String,
  pub repo_kind: String,
  pub module: Option<String>,
  pub checkoutdir: Option<String>,
  pub revision: Option<String>,
  pub tag: Option<String>,
  srcdir: PathBuf,
}

impl LocalBranch {
  pub fn from_element(repository: &Repository, element: Option<&Element>, module_name: &str, config: &Config) -> Self {
    let attr = |key: &str| element.and_then(|e| e.attr(key)).map(str::to_string);
    let module = attr("module");
    let checkoutdir = attr("checkoutdir");
    let dir = checkoutdir
      .clone()
      .or_else(|| module.as_deref().and_then(|m| m.rsplit('/').next()).map(str::to_string))
      .unwrap_or_else(|| module_name.to_string());

    Self {
      repo: repository.name.clone(),
      repo_kind: repository.kind.clone(),
      module,
      checkoutdir,
      revision: attr("revision"),
      tag: attr("tag"),
      srcdir: config.checkoutroot.join(dir),
    }
  }

  /// A branch for a module with no repository at all.
  pub fn implicit(module_name: &str, config: &Config) -> Self {
    Self {
      repo: String::new(),
      repo_kind: "local".to_string(),
      module: None,
      checkoutdir: None,
      revision: None,
      tag: None,
      srcdir: config.checkoutroot.join(module_name),
    }
  }
}

impl Branch for LocalBranch {
  fn srcdir(&self) -> &Path {
    &self.srcdir
  }

  fn checkout(&self, ctx: &mut BuildContext) -> Result<(), PhaseError> {
    if self.srcdir.is_dir() {
      return Ok(());
    }
    if ctx.config().nonetwork {
      return Err(PhaseError::state(format!(
        "source directory {} is missing and network access is disabled",
        self.srcdir.display()
      )));
    }
    Err(PhaseError::state(format!(
      "no checkout support for '{}' repositories; populate {} first",
      self.repo_kind,
      self.srcdir.display()
    )))
  }

  fn force_checkout(&self, _ctx: &mut BuildContext) -> Result<(), PhaseError> {
    Err(PhaseError::state(format!(
      "cannot re-fetch {}: '{}' repositories have no checkout support",
      self.srcdir.display(),
      self.repo_kind
    )))
  }

  fn tree_id(&self) -> Option<String> {
    self.revision.clone().or_else(|| self.tag.clone())
  }

  fn to_element(&self) -> Element {
    let mut element = Element::new("branch");
    if !self.repo.is_empty() {
      element.set_attr("repo", self.repo.as_str());
    }
    for (key, value) in [
      ("module", &self.module),
      ("checkoutdir", &self.checkoutdir),
      ("revision", &self.revision),
      ("tag", &self.tag),
    ] {
      if let Some(value) = value {
        element.set_attr(key, value.as_str());
      }
    }
    element
  }
}
