//! Phase tables and phase results.
//!
//! A backend declares its pipeline as a static slice of [`Phase`] values. The
//! runner walks the slice in order, consulting each phase's skip predicate,
//! and uses the recovery list to offer alternatives when a phase fails.

use std::io;

use thiserror::Error;

use crate::build::context::BuildContext;
use crate::build::exec::CommandError;
use crate::build::install::InstallError;
use crate::module::Module;

pub const CHECKOUT: &str = "checkout";
pub const FORCE_CHECKOUT: &str = "force_checkout";
pub const DOWNLOAD: &str = "download";
pub const UNPACK: &str = "unpack";
pub const PATCH: &str = "patch";
pub const CLEAN: &str = "clean";
pub const CONFIGURE: &str = "configure";
pub const BUILD: &str = "build";
pub const CHECK: &str = "check";
pub const DIST: &str = "dist";
pub const INSTALL: &str = "install";
pub const MODULES_INSTALL: &str = "modules_install";
pub const SYSDEPS: &str = "sysdeps";
pub const DONE: &str = "done";

/// How the pipeline continues after a phase succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  /// Proceed to the next phase in declared order.
  Next,
  /// Continue at the named phase.
  SkipToPhase(&'static str),
  /// Nothing left to do; the module is complete.
  SkipToEnd,
}

/// A recoverable failure inside a phase.
#[derive(Debug, Error)]
pub enum PhaseError {
  /// A precondition of the phase does not hold.
  #[error("{0}")]
  BuildState(String),

  #[error(transparent)]
  Command(#[from] CommandError),

  #[error(transparent)]
  Install(#[from] InstallError),

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: io::Error,
  },
}

impl PhaseError {
  pub fn state(message: impl Into<String>) -> Self {
    PhaseError::BuildState(message.into())
  }

  pub fn io(context: impl Into<String>, source: io::Error) -> Self {
    PhaseError::Io {
      context: context.into(),
      source,
    }
  }

  /// True when the failure came from the user interrupting a command.
  pub fn is_interrupt(&self) -> bool {
    matches!(self, PhaseError::Command(CommandError::Interrupted { .. }))
  }
}

pub type PhaseResult = Result<Flow, PhaseError>;

pub type PhaseAction<T> = fn(&T, &Module, &mut BuildContext) -> PhaseResult;

/// Returns true to skip the phase. Receives the phase the runner comes from:
/// the last one completed, or the failed one when entered from the error menu.
pub type SkipPredicate<T> = fn(&T, &Module, &BuildContext, Option<&str>) -> bool;

/// One step of a backend's pipeline.
pub struct Phase<T> {
  pub name: &'static str,
  pub action: PhaseAction<T>,
  pub skip: Option<SkipPredicate<T>>,
  /// Phases the user may jump to when this one fails.
  pub recovery: &'static [&'static str],
  /// Ask before entering this phase from the error menu.
  pub requires_confirmation: bool,
  /// Set for phases outside the normal order (e.g. `force_checkout`). After
  /// such a phase runs, the pipeline resumes after the named phase.
  pub resumes_as: Option<&'static str>,
  /// Consult the build policy once this phase completes or is skipped.
  pub policy_checkpoint: bool,
}

impl<T> Phase<T> {
  pub const fn new(name: &'static str, action: PhaseAction<T>) -> Self {
    Self {
      name,
      action,
      skip: None,
      recovery: &[],
      requires_confirmation: false,
      resumes_as: None,
      policy_checkpoint: false,
    }
  }

  pub fn spec(&self) -> PhaseSpec {
    PhaseSpec {
      name: self.name,
      recovery: self.recovery,
      requires_confirmation: self.requires_confirmation,
      resumes_as: self.resumes_as,
      policy_checkpoint: self.policy_checkpoint,
    }
  }
}

/// Metadata of a phase, without its functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSpec {
  pub name: &'static str,
  pub recovery: &'static [&'static str],
  pub requires_confirmation: bool,
  pub resumes_as: Option<&'static str>,
  pub policy_checkpoint: bool,
}

impl PhaseSpec {
  /// Part of the normal pipeline order.
  pub fn in_plan(&self) -> bool {
    self.resumes_as.is_none()
  }
}

/// Metadata of every phase in `table`, in declared order.
pub fn specs<T>(table: &[Phase<T>]) -> Vec<PhaseSpec> {
  table.iter().map(Phase::spec).collect()
}

/// Evaluates the skip predicate of `name`. Unknown phases are never skipped.
pub fn should_skip<T>(
  table: &[Phase<T>],
  backend: &T,
  name: &str,
  module: &Module,
  ctx: &BuildContext,
  last: Option<&str>,
) -> bool {
  table
    .iter()
    .find(|p| p.name == name)
    .and_then(|p| p.skip)
    .is_some_and(|skip| skip(backend, module, ctx, last))
}

/// Runs the action of `name`.
pub fn dispatch<T>(
  table: &[Phase<T>],
  backend: &T,
  name: &str,
  module: &Module,
  ctx: &mut BuildContext,
) -> PhaseResult {
  match table.iter().find(|p| p.name == name) {
    Some(phase) => (phase.action)(backend, module, ctx),
    None => Err(PhaseError::state(format!(
      "{} modules have no '{}' phase",
      module.type_name(),
      name
    ))),
  }
}
