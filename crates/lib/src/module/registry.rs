//! Module-type registry.
//!
//! Maps descriptor tags to parser functions. A registry is built per loader,
//! so tests can inject their own backends. Tags may be registered lazily: the
//! loader hook runs on first use and its result is cached.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use tracing::debug;

use crate::config::Config;
use crate::descriptor::Element;
use crate::module::Module;
use crate::module::ModuleType;
use crate::module::branch::{Branch, BranchFactory, LocalBranch, Repository};
use crate::module::systemdeps::SystemDependency;
use crate::moduleset::ModuleSetError;

/// Turns a descriptor element into a module.
pub type ParseFn = fn(&Element, &ParseContext<'_>) -> Result<Module, ModuleSetError>;

type Loader = Box<dyn Fn() -> ParseFn + Send + Sync>;

enum Entry {
  Ready(ParseFn),
  Lazy { loader: Loader, loaded: OnceLock<ParseFn> },
}

impl Entry {
  fn resolve(&self) -> ParseFn {
    match self {
      Entry::Ready(parse) => *parse,
      Entry::Lazy { loader, loaded } => *loaded.get_or_init(|| loader()),
    }
  }
}

#[derive(Default)]
pub struct TypeRegistry {
  entries: BTreeMap<String, Entry>,
}

impl std::fmt::Debug for TypeRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TypeRegistry").field("tags", &self.entries.keys().collect::<Vec<_>>()).finish()
  }
}

impl TypeRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding every built-in backend.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    crate::modtypes::register_builtins(&mut registry);
    registry
  }

  pub fn register(&mut self, tag: impl Into<String>, parse: ParseFn) {
    self.entries.insert(tag.into(), Entry::Ready(parse));
  }

  /// Registers `tag` with a hook that yields the parser on first use.
  pub fn register_lazy(&mut self, tag: impl Into<String>, loader: impl Fn() -> ParseFn + Send + Sync + 'static) {
    self.entries.insert(
      tag.into(),
      Entry::Lazy {
        loader: Box::new(loader),
        loaded: OnceLock::new(),
      },
    );
  }

  pub fn contains(&self, tag: &str) -> bool {
    self.entries.contains_key(tag)
  }

  /// Whether the parser for `tag` has been resolved.
  pub fn is_loaded(&self, tag: &str) -> bool {
    match self.entries.get(tag) {
      Some(Entry::Ready(_)) => true,
      Some(Entry::Lazy { loaded, .. }) => loaded.get().is_some(),
      None => false,
    }
  }

  pub fn tags(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  /// Parses `element` with the parser registered for its tag.
  pub fn parse(&self, element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
    let entry = self.entries.get(&element.name).ok_or_else(|| ModuleSetError::UnknownType {
      tag: element.name.clone(),
      module: element.attr("id").map(str::to_string),
    })?;
    let parse = entry.resolve();
    debug!(tag = %element.name, id = ?element.attr("id"), "parsing module");
    parse(element, ctx)
  }
}

/// What a parser may consult while building a module.
pub struct ParseContext<'a> {
  pub config: &'a Config,
  pub repositories: &'a BTreeMap<String, Repository>,
  pub default_repo: Option<&'a str>,
  pub branch_factory: &'a dyn BranchFactory,
}

impl ParseContext<'_> {
  /// Builds a module from the attributes and children every type shares.
  pub fn module(&self, element: &Element, kind: Box<dyn ModuleType>) -> Result<Module, ModuleSetError> {
    let name = element.attr("id").ok_or_else(|| ModuleSetError::MissingId {
      tag: element.name.clone(),
    })?;

    let mut module = Module::new(name, kind);
    module.supports_parallel_build = element.bool_attr("supports-parallel-builds", true)?;
    module.dependencies = dep_names(element, "dependencies");
    module.suggests = dep_names(element, "suggests");
    module.after = dep_names(element, "after");
    if let Some(sysdeps) = element.child("systemdependencies") {
      module.system_dependencies = SystemDependency::parse_list(name, sysdeps)?;
    }
    module.pkg_config = element
      .child("pkg-config")
      .map(|e| e.text.trim().to_string())
      .filter(|s| !s.is_empty());
    module.branch = self.branch(element, name, module.kind.needs_branch())?;
    Ok(module)
  }

  fn branch(
    &self,
    element: &Element,
    name: &str,
    needs_branch: bool,
  ) -> Result<Option<Box<dyn Branch>>, ModuleSetError> {
    let branch_element = element.child("branch");
    let repo_name = branch_element.and_then(|b| b.attr("repo")).or(self.default_repo);

    let Some(repo_name) = repo_name else {
      let local = Repository {
        name: String::new(),
        kind: "local".to_string(),
        href: None,
        default: false,
      };
      return Ok(match branch_element {
        Some(b) => Some(Box::new(LocalBranch::from_element(&local, Some(b), name, self.config))),
        None if needs_branch => Some(Box::new(LocalBranch::implicit(name, self.config))),
        None => None,
      });
    };

    if branch_element.is_none() && !needs_branch {
      return Ok(None);
    }

    let repository = self
      .repositories
      .get(repo_name)
      .ok_or_else(|| ModuleSetError::UnknownRepository {
        module: name.to_string(),
        repository: repo_name.to_string(),
      })?;
    self
      .branch_factory
      .create(repository, branch_element, name, self.config)
      .map(Some)
      .map_err(|message| ModuleSetError::Branch {
        module: name.to_string(),
        message,
      })
  }
}

fn dep_names(element: &Element, list: &str) -> Vec<String> {
  element
    .child(list)
    .map(|l| {
      l.children_named("dep")
        .filter_map(|d| d.attr("package"))
        .map(str::to_string)
        .collect()
    })
    .unwrap_or_default()
}
