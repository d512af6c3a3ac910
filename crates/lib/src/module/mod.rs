//! The module node and the backend contract.
//!
//! A [`Module`] carries what every module has in common: its name, its three
//! kinds of graph edges, system dependencies and the branch it is built from.
//! What differs between build systems lives behind [`ModuleType`], which each
//! backend implements on top of a static phase table.

pub mod branch;
pub mod phase;
pub mod registry;
pub mod systemdeps;

use std::fmt;
use std::path::PathBuf;

use crate::build::context::BuildContext;
use crate::config::Config;
use crate::descriptor::Element;

use self::branch::Branch;
use self::phase::{PhaseResult, PhaseSpec};
use self::systemdeps::SystemDependency;

/// Behaviour a build backend plugs into the engine.
///
/// Phase tables are declared as `&'static [Phase<Self>]` and exposed through
/// [`phase::specs`], [`phase::should_skip`] and [`phase::dispatch`].
pub trait ModuleType: fmt::Debug + Send + Sync {
  /// Descriptor tag, e.g. `autotools`.
  fn type_name(&self) -> &'static str;

  /// Declared phases, in pipeline order.
  fn phase_specs(&self) -> Vec<PhaseSpec>;

  fn should_skip(&self, phase: &str, module: &Module, ctx: &BuildContext, last: Option<&str>) -> bool;

  fn run_phase(&self, phase: &str, module: &Module, ctx: &mut BuildContext) -> PhaseResult;

  fn srcdir(&self, module: &Module, config: &Config) -> PathBuf {
    match &module.branch {
      Some(branch) => branch.srcdir().to_path_buf(),
      None => config.checkoutroot.join(&module.name),
    }
  }

  fn builddir(&self, module: &Module, config: &Config) -> PathBuf {
    self.srcdir(module, config)
  }

  /// Revision recorded in the package database. `None` means "no meaningful
  /// revision"; it is stored as the empty string.
  fn revision(&self, module: &Module) -> Option<String> {
    module.branch.as_ref().and_then(|b| b.tree_id())
  }

  /// The configure invocation, when the backend has one.
  fn configure_command(&self, _module: &Module, _config: &Config) -> Option<String> {
    None
  }

  /// Whether installs are staged into a DESTDIR and promoted.
  fn supports_install_destdir(&self) -> bool {
    false
  }

  /// Whether a module without a `<branch>` gets an implicit one.
  fn needs_branch(&self) -> bool {
    true
  }

  /// Adds type-specific attributes and children to a serialized module.
  fn write_descriptor(&self, _element: &mut Element) {}
}

/// A node of the module graph.
#[derive(Debug)]
pub struct Module {
  pub name: String,
  /// Must be built before this module.
  pub dependencies: Vec<String>,
  /// Ordered before this module when both are built.
  pub after: Vec<String>,
  /// Hard dependencies that may be missing from the moduleset.
  pub suggests: Vec<String>,
  pub system_dependencies: Vec<SystemDependency>,
  pub branch: Option<Box<dyn Branch>>,
  pub pkg_config: Option<String>,
  pub supports_parallel_build: bool,
  /// Set programmatically; configured `module_extra_env` is merged over it by [`Module::env`].
  pub extra_env: Vec<(String, String)>,
  pub kind: Box<dyn ModuleType>,
}

impl Module {
  pub fn new(name: impl Into<String>, kind: Box<dyn ModuleType>) -> Self {
    Self {
      name: name.into(),
      dependencies: Vec::new(),
      after: Vec::new(),
      suggests: Vec::new(),
      system_dependencies: Vec::new(),
      branch: None,
      pkg_config: None,
      supports_parallel_build: true,
      extra_env: Vec::new(),
      kind,
    }
  }

  pub fn type_name(&self) -> &'static str {
    self.kind.type_name()
  }

  pub fn srcdir(&self, config: &Config) -> PathBuf {
    self.kind.srcdir(self, config)
  }

  pub fn builddir(&self, config: &Config) -> PathBuf {
    self.kind.builddir(self, config)
  }

  pub fn revision(&self) -> Option<String> {
    self.kind.revision(self)
  }

  pub fn configure_command(&self, config: &Config) -> Option<String> {
    self.kind.configure_command(self, config)
  }

  pub fn supports_install_destdir(&self) -> bool {
    self.kind.supports_install_destdir()
  }

  pub fn phases(&self) -> Vec<PhaseSpec> {
    self.kind.phase_specs()
  }

  /// Environment for commands run on behalf of this module.
  pub fn env(&self, config: &Config) -> Vec<(String, String)> {
    let mut env = self.extra_env.clone();
    for (key, value) in config.extra_env_for(&self.name) {
      match env.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => env.push((key, value)),
      }
    }
    env
  }

  /// Serializes the module as a descriptor element.
  pub fn to_element(&self) -> Element {
    let mut element = Element::new(self.type_name()).with_attr("id", self.name.as_str());
    if !self.supports_parallel_build {
      element.set_attr("supports-parallel-builds", "no");
    }
    if let Some(branch) = &self.branch {
      element.children.push(branch.to_element());
    }
    self.kind.write_descriptor(&mut element);

    for (tag, names) in [
      ("dependencies", &self.dependencies),
      ("suggests", &self.suggests),
      ("after", &self.after),
    ] {
      if names.is_empty() {
        continue;
      }
      let mut list = Element::new(tag);
      for name in names {
        list.children.push(Element::new("dep").with_attr("package", name.as_str()));
      }
      element.children.push(list);
    }

    if !self.system_dependencies.is_empty() {
      let mut list = Element::new("systemdependencies");
      for dep in &self.system_dependencies {
        list.children.push(dep.to_element("dep"));
      }
      element.children.push(list);
    }
    if let Some(pc) = &self.pkg_config {
      element.children.push(Element::new("pkg-config").with_text(pc.as_str()));
    }
    element
  }
}

impl fmt::Display for Module {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.name, self.type_name())
  }
}
