//! Top-level build loop.
//!
//! Modules run strictly one after another in the order given. When a module
//! fails, every later module with a hard dependency on it (directly or
//! through another unbuildable module) is poisoned and never started.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::build::context::BuildContext;
use crate::build::runner::{ErrorHandler, RunOutcome, run_module};
use crate::module::Module;
use crate::module::phase::PhaseError;
use crate::moduleset::{ModuleSet, ModuleSetError};

#[derive(Debug, Error)]
pub enum DriverError {
  #[error("failed to create {path}: {source}")]
  Prepare {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  ModuleSet(#[from] ModuleSetError),
}

/// In-memory state of one driver run.
#[derive(Debug, Default)]
pub struct BuildState {
  pub order: Vec<String>,
  /// Modules that failed or were poisoned, with the dependency that poisoned
  /// them (`None` for modules that failed themselves).
  pub unbuildable: BTreeMap<String, Option<String>>,
  pub index: usize,
}

impl BuildState {
  fn new(modules: &[&Module]) -> Self {
    Self {
      order: modules.iter().map(|m| m.name.clone()).collect(),
      ..Default::default()
    }
  }

  /// The first hard dependency of `module` that cannot be built.
  fn blocking_dependency<'m>(&self, module: &'m Module) -> Option<&'m str> {
    module
      .dependencies
      .iter()
      .map(String::as_str)
      .find(|dep| self.unbuildable.contains_key(*dep))
  }
}

/// A module that failed one of its phases.
#[derive(Debug)]
pub struct FailedModule {
  pub module: String,
  pub phase: &'static str,
  pub error: PhaseError,
}

/// Result of a whole driver run.
#[derive(Debug, Default)]
pub struct BuildSummary {
  /// Modules that went through every phase.
  pub built: Vec<String>,
  /// Modules the build policy or a phase declared up to date.
  pub skipped: Vec<String>,
  pub failed: Vec<FailedModule>,
  /// Poisoned module and the unbuildable dependency responsible.
  pub poisoned: Vec<(String, String)>,
}

impl BuildSummary {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.poisoned.is_empty()
  }

  pub fn total(&self) -> usize {
    self.built.len() + self.skipped.len() + self.failed.len() + self.poisoned.len()
  }
}

/// Builds `modules` in the given order.
///
/// `modules` normally comes from [`ModuleSet::get_module_list`]; the
/// moduleset supplies transitive dependencies for the build policy.
pub fn build(
  moduleset: &ModuleSet,
  modules: &[&Module],
  ctx: &mut BuildContext,
  handler: &mut dyn ErrorHandler,
) -> Result<BuildSummary, DriverError> {
  prepare_dirs(ctx)?;

  let mut state = BuildState::new(modules);
  let mut summary = BuildSummary::default();
  let total = modules.len();
  info!(modules = total, policy = %ctx.config().build_policy, "starting build");

  for (index, module) in modules.iter().enumerate() {
    state.index = index;

    if let Some(dep) = state.blocking_dependency(module) {
      ctx.message(&format!("module {} not built due to non buildable {}", module.name, dep));
      state.unbuildable.insert(module.name.clone(), Some(dep.to_string()));
      summary.poisoned.push((module.name.clone(), dep.to_string()));
      continue;
    }

    let dependencies = moduleset.transitive_dependencies(&module.name)?;
    ctx.notify(|o| o.start_module(&module.name, index, total));
    let outcome = run_module(module, &dependencies, ctx, handler);
    ctx.notify(|o| o.end_module(&module.name, &outcome));

    match outcome {
      RunOutcome::Built => summary.built.push(module.name.clone()),
      RunOutcome::Skipped => summary.skipped.push(module.name.clone()),
      RunOutcome::Failed { phase, error } => {
        warn!(module = %module.name, phase, error = %error, "module failed");
        state.unbuildable.insert(module.name.clone(), None);
        summary.failed.push(FailedModule {
          module: module.name.clone(),
          phase,
          error,
        });
      }
    }
  }

  info!(
    built = summary.built.len(),
    skipped = summary.skipped.len(),
    failed = summary.failed.len(),
    poisoned = summary.poisoned.len(),
    "build finished"
  );
  Ok(summary)
}

fn prepare_dirs(ctx: &BuildContext) -> Result<(), DriverError> {
  let config = ctx.config();
  let dirs: BTreeSet<&PathBuf> = [&config.checkoutroot, &config.prefix, &config.top_builddir].into_iter().collect();
  for dir in dirs {
    fs::create_dir_all(dir).map_err(|source| DriverError::Prepare {
      path: dir.clone(),
      source,
    })?;
  }
  Ok(())
}
