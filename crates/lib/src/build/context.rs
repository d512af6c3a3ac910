//! The execution interface handed to phases.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::build::exec::{Cmd, CommandError, Executor};
use crate::build::runner::RunOutcome;
use crate::config::Config;
use crate::module::phase::PhaseError;
use crate::packagedb::PackageDb;

/// Receives progress events. Every method has an empty default.
pub trait BuildObserver: Send {
  fn set_action(&mut self, _label: &str, _module: &str) {}

  fn message(&mut self, _text: &str) {}

  fn start_module(&mut self, _module: &str, _index: usize, _total: usize) {}

  fn end_module(&mut self, _module: &str, _outcome: &RunOutcome) {}

  fn start_phase(&mut self, _module: &str, _phase: &str) {}

  fn end_phase(&mut self, _module: &str, _phase: &str, _error: Option<&PhaseError>) {}
}

/// Configuration, package database and command runner for one build.
pub struct BuildContext {
  config: Arc<Config>,
  pub packagedb: PackageDb,
  executor: Box<dyn Executor>,
  observer: Option<Box<dyn BuildObserver>>,
}

impl std::fmt::Debug for BuildContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildContext")
      .field("prefix", &self.config.prefix)
      .field("packagedb", &self.packagedb.path())
      .finish_non_exhaustive()
  }
}

impl BuildContext {
  pub fn new(config: Arc<Config>, packagedb: PackageDb, executor: Box<dyn Executor>) -> Self {
    Self {
      config,
      packagedb,
      executor,
      observer: None,
    }
  }

  pub fn with_observer(mut self, observer: Box<dyn BuildObserver>) -> Self {
    self.observer = Some(observer);
    self
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn execute(&mut self, cmd: &Cmd, cwd: &Path, env: &[(String, String)]) -> Result<(), CommandError> {
    debug!(command = %cmd, cwd = %cwd.display(), "running");
    self.executor.execute(cmd, cwd, env)
  }

  pub fn probe(&mut self, cmd: &Cmd, cwd: &Path) -> bool {
    self.executor.probe(cmd, cwd)
  }

  pub fn interactive_shell(&mut self, cwd: &Path) -> Result<(), CommandError> {
    self.executor.interactive_shell(cwd)
  }

  /// True while the user holds the build paused.
  pub fn is_suspended(&self) -> bool {
    self.executor.pause_handle().is_some_and(|h| h.is_paused())
  }

  /// Reports what is happening to `module` now.
  pub fn set_action(&mut self, label: &str, module: &str) {
    info!(module = %module, "{}", label);
    self.notify(|o| o.set_action(label, module));
  }

  pub fn message(&mut self, text: &str) {
    info!("{}", text);
    self.notify(|o| o.message(text));
  }

  pub(crate) fn notify(&mut self, f: impl FnOnce(&mut dyn BuildObserver)) {
    if let Some(observer) = self.observer.as_deref_mut() {
      f(observer);
    }
  }
}
