//! Reading moduleset documents and their includes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ModuleSet, ModuleSetError};
use crate::config::Config;
use crate::descriptor::{self, Element};
use crate::module::branch::{BranchFactory, LocalBranchFactory, Repository};
use crate::module::registry::{ParseContext, TypeRegistry};

/// Loads modulesets with a fixed type registry, configuration and branch
/// factory.
pub struct ModuleSetLoader<'a> {
  registry: &'a TypeRegistry,
  config: &'a Config,
  branch_factory: &'a dyn BranchFactory,
}

/// Accumulated state while walking a document and its includes.
#[derive(Default)]
struct Loaded {
  set: ModuleSet,
  visited: BTreeSet<PathBuf>,
}

impl<'a> ModuleSetLoader<'a> {
  pub fn new(registry: &'a TypeRegistry, config: &'a Config) -> Self {
    Self {
      registry,
      config,
      branch_factory: &LocalBranchFactory,
    }
  }

  pub fn with_branch_factory(mut self, factory: &'a dyn BranchFactory) -> Self {
    self.branch_factory = factory;
    self
  }

  /// Loads the moduleset at `path`, following relative includes.
  pub fn load(&self, path: &Path) -> Result<ModuleSet, ModuleSetError> {
    info!(path = %path.display(), "loading moduleset");
    let mut loaded = Loaded::default();
    self.load_file(path, &mut loaded)?;
    self.finish(loaded)
  }

  /// Loads a moduleset from text; includes resolve against `base_dir`.
  pub fn load_str(&self, text: &str, base_dir: &Path) -> Result<ModuleSet, ModuleSetError> {
    let mut loaded = Loaded::default();
    let root = descriptor::parse_str(text)?;
    self.load_document(&root, base_dir, &mut loaded)?;
    self.finish(loaded)
  }

  fn finish(&self, mut loaded: Loaded) -> Result<ModuleSet, ModuleSetError> {
    loaded.set.resolve()?;
    debug!(modules = loaded.set.len(), "moduleset resolved");
    Ok(loaded.set)
  }

  fn load_file(&self, path: &Path, loaded: &mut Loaded) -> Result<(), ModuleSetError> {
    let canonical = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !loaded.visited.insert(canonical.clone()) {
      debug!(path = %canonical.display(), "already included");
      return Ok(());
    }
    let root = descriptor::parse_file(&canonical)?;
    let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
    self.load_document(&root, &base, loaded)
  }

  /// Parses one document. Repositories are scoped to the document declaring
  /// them; modules replace earlier definitions of the same name.
  fn load_document(&self, root: &Element, base: &Path, loaded: &mut Loaded) -> Result<(), ModuleSetError> {
    if root.name != "moduleset" {
      return Err(ModuleSetError::NotAModuleset(root.name.clone()));
    }

    let mut repositories: BTreeMap<String, Repository> = BTreeMap::new();
    let mut default_repo: Option<String> = None;

    for element in &root.children {
      match element.name.as_str() {
        "repository" => {
          let repo = Repository {
            name: element.required_attr("name")?.to_string(),
            kind: element.attr("type").unwrap_or("git").to_string(),
            href: element.attr("href").map(str::to_string),
            default: element.bool_attr("default", false)?,
          };
          if repo.default {
            default_repo = Some(repo.name.clone());
            loaded.set.default_repo = Some(repo.name.clone());
          }
          loaded.set.repositories.insert(repo.name.clone(), repo.clone());
          repositories.insert(repo.name.clone(), repo);
        }
        "include" => {
          let href = element.required_attr("href")?;
          let path = include_path(href, base)?;
          debug!(href, path = %path.display(), "following include");
          self.load_file(&path, loaded)?;
        }
        _ => {
          let ctx = ParseContext {
            config: self.config,
            repositories: &repositories,
            default_repo: default_repo.as_deref(),
            branch_factory: self.branch_factory,
          };
          let module = self.registry.parse(element, &ctx)?;
          if loaded.set.modules.contains_key(&module.name) {
            debug!(module = %module.name, "redefined, keeping the later definition");
          }
          loaded.set.modules.insert(module.name.clone(), module);
        }
      }
    }
    Ok(())
  }
}

fn include_path(href: &str, base: &Path) -> Result<PathBuf, ModuleSetError> {
  if href.contains("://") && !href.starts_with("file://") {
    return Err(ModuleSetError::Include {
      href: href.to_string(),
      reason: "only local includes are supported".to_string(),
    });
  }
  let href = href.strip_prefix("file://").unwrap_or(href);
  Ok(base.join(href))
}
