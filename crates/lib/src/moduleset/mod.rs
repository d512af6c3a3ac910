//! Modulesets: the catalogue of modules a build draws from.
//!
//! A moduleset is loaded from one or more descriptor documents, resolved so
//! every hard dependency names a known module, and checked for dependency
//! cycles. Build sets are selected from it and ordered topologically.

mod graph;
mod load;

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use thiserror::Error;
use tracing::debug;

use crate::descriptor::{self, DescriptorError, Element};
use crate::module::Module;
use crate::module::branch::Repository;

pub use load::ModuleSetLoader;

#[derive(Debug, Error)]
pub enum ModuleSetError {
  #[error(transparent)]
  Descriptor(#[from] DescriptorError),

  #[error("expected a <moduleset> document, found <{0}>")]
  NotAModuleset(String),

  #[error("unknown module type <{tag}>{}", module.as_ref().map(|m| format!(" (module '{}')", m)).unwrap_or_default())]
  UnknownType { tag: String, module: Option<String> },

  #[error("<{tag}> element has no id")]
  MissingId { tag: String },

  #[error("module '{module}' depends on unknown module '{dependency}'")]
  UnknownDependency { module: String, dependency: String },

  #[error("dependency cycle: {}", path.join(" -> "))]
  Cycle { path: Vec<String> },

  #[error("module '{module}' refers to undeclared repository '{repository}'")]
  UnknownRepository { module: String, repository: String },

  #[error("module '{0}' not found")]
  UnknownModule(String),

  #[error("module '{module}': {message}")]
  InvalidModule { module: String, message: String },

  #[error("cannot include '{href}': {reason}")]
  Include { href: String, reason: String },

  #[error("module '{module}': {message}")]
  Branch { module: String, message: String },

  #[error("failed to write dependency graph: {0}")]
  Graph(#[source] io::Error),
}

/// How [`ModuleSet::get_module_list`] grows the requested modules.
#[derive(Debug, Clone)]
pub struct SelectOptions {
  pub include_dependencies: bool,
  pub include_suggests: bool,
  /// Never selected, even when requested or depended upon.
  pub skip: Vec<String>,
}

impl Default for SelectOptions {
  fn default() -> Self {
    Self {
      include_dependencies: true,
      include_suggests: true,
      skip: Vec::new(),
    }
  }
}

#[derive(Debug, Default)]
pub struct ModuleSet {
  modules: BTreeMap<String, Module>,
  repositories: BTreeMap<String, Repository>,
  default_repo: Option<String>,
}

impl ModuleSet {
  /// Builds a resolved moduleset from already-parsed modules. Later modules
  /// replace earlier ones with the same name.
  pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Result<Self, ModuleSetError> {
    let mut set = Self::default();
    for module in modules {
      set.modules.insert(module.name.clone(), module);
    }
    set.resolve()?;
    Ok(set)
  }

  /// Rewrites dependency lists so every name refers to a loaded module.
  ///
  /// Unknown hard dependencies are fatal; unknown `suggests` and `after`
  /// entries are dropped. Hard dependencies are then checked for cycles.
  fn resolve(&mut self) -> Result<(), ModuleSetError> {
    let known: BTreeSet<String> = self.modules.keys().cloned().collect();
    for module in self.modules.values_mut() {
      if let Some(missing) = module.dependencies.iter().find(|d| !known.contains(*d)) {
        return Err(ModuleSetError::UnknownDependency {
          module: module.name.clone(),
          dependency: missing.clone(),
        });
      }
      for (kind, list) in [("suggests", &mut module.suggests), ("after", &mut module.after)] {
        list.retain(|name| {
          let found = known.contains(name);
          if !found {
            debug!(module = %module.name, dependency = %name, kind, "dropping unknown soft dependency");
          }
          found
        });
      }
    }
    graph::check_cycles(&self.modules)
  }

  pub fn get(&self, name: &str) -> Option<&Module> {
    self.modules.get(name)
  }

  /// All modules, sorted by name.
  pub fn modules(&self) -> impl Iterator<Item = &Module> {
    self.modules.values()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.modules.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
    self.repositories.values()
  }

  fn require(&self, name: &str) -> Result<&Module, ModuleSetError> {
    self.get(name).ok_or_else(|| ModuleSetError::UnknownModule(name.to_string()))
  }

  /// The modules needed to build `seeds`, in build order.
  pub fn get_module_list<S: AsRef<str>>(
    &self,
    seeds: &[S],
    options: &SelectOptions,
  ) -> Result<Vec<&Module>, ModuleSetError> {
    let skip: BTreeSet<&str> = options.skip.iter().map(String::as_str).collect();
    let mut selected: BTreeSet<&str> = BTreeSet::new();
    let mut stack: Vec<&str> = Vec::new();

    for seed in seeds {
      let module = self.require(seed.as_ref())?;
      if !skip.contains(module.name.as_str()) {
        stack.push(&module.name);
      }
    }

    while let Some(name) = stack.pop() {
      if !selected.insert(name) {
        continue;
      }
      let module = self.require(name)?;
      let mut next: Vec<&String> = Vec::new();
      if options.include_dependencies {
        next.extend(&module.dependencies);
      }
      if options.include_suggests {
        next.extend(&module.suggests);
      }
      stack.extend(
        next
          .into_iter()
          .map(String::as_str)
          .filter(|n| !skip.contains(n) && !selected.contains(n)),
      );
    }

    Ok(
      graph::topological_order(&self.modules, &selected)
        .into_iter()
        .filter_map(|name| self.modules.get(name))
        .collect(),
    )
  }

  /// Every module in build order.
  pub fn get_full_module_list(&self, skip: &[String]) -> Vec<&Module> {
    let skip: BTreeSet<&str> = skip.iter().map(String::as_str).collect();
    let names: BTreeSet<&str> = self.names().filter(|n| !skip.contains(n)).collect();
    graph::topological_order(&self.modules, &names)
      .into_iter()
      .filter_map(|name| self.modules.get(name))
      .collect()
  }

  /// Hard dependencies of `name`, direct and indirect, sorted by name.
  pub fn transitive_dependencies(&self, name: &str) -> Result<Vec<String>, ModuleSetError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut stack: Vec<&str> = self.require(name)?.dependencies.iter().map(String::as_str).collect();
    while let Some(dep) = stack.pop() {
      if seen.insert(dep) {
        stack.extend(self.require(dep)?.dependencies.iter().map(String::as_str));
      }
    }
    Ok(seen.into_iter().map(str::to_string).collect())
  }

  /// Modules that depend on `name`, directly or indirectly, in build order.
  pub fn reverse_dependencies(&self, name: &str) -> Result<Vec<String>, ModuleSetError> {
    self.require(name)?;
    let mut dependents: BTreeSet<&str> = BTreeSet::new();
    let mut frontier = vec![name];
    while let Some(current) = frontier.pop() {
      for module in self.modules.values() {
        if module.dependencies.iter().any(|d| d == current) && dependents.insert(&module.name) {
          frontier.push(&module.name);
        }
      }
    }
    Ok(
      graph::topological_order(&self.modules, &dependents)
        .into_iter()
        .map(str::to_string)
        .collect(),
    )
  }

  /// Writes a Graphviz digraph of `names` (all modules when empty) and
  /// everything they depend on.
  pub fn write_dot<S: AsRef<str>, W: io::Write>(&self, names: &[S], out: &mut W) -> Result<(), ModuleSetError> {
    let selected: Vec<&Module> = if names.is_empty() {
      self.modules.values().collect()
    } else {
      self.get_module_list(
        names,
        &SelectOptions {
          include_suggests: true,
          ..Default::default()
        },
      )?
    };
    graph::write_dot(&selected, out).map_err(ModuleSetError::Graph)
  }

  /// The moduleset as a single `<moduleset>` element.
  pub fn to_document(&self) -> Element {
    let mut root = Element::new("moduleset");
    for repo in self.repositories.values() {
      let mut repo = repo.clone();
      repo.default = self.default_repo.as_deref() == Some(repo.name.as_str());
      root.children.push(repo.to_element());
    }
    for module in self.modules.values() {
      root.children.push(module.to_element());
    }
    root
  }

  pub fn serialize(&self) -> Result<String, ModuleSetError> {
    Ok(descriptor::to_string(&self.to_document())?)
  }
}
