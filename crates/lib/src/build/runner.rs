//! Per-module phase state machine.
//!
//! The runner walks a module's declared phases in order. Skipped phases count
//! as completed. A phase may redirect the pipeline with [`Flow`], and a failed
//! phase is routed through an [`ErrorHandler`] which decides between retrying,
//! continuing, jumping to a recovery phase, opening a shell or giving up.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::build::context::BuildContext;
use crate::build::policy;
use crate::module::Module;
use crate::module::phase::{Flow, PhaseError, PhaseSpec};

/// What to do after a phase failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorChoice {
  /// Run the failed phase again.
  Retry,
  /// Ignore the error and go on with the next phase.
  Continue,
  /// Go to a phase from the failed phase's recovery list.
  Jump(String),
  /// Open a shell in the build directory, then ask again.
  Shell,
  /// Give up on the module; dependents are poisoned.
  Poison,
}

/// A failed phase, as presented to an [`ErrorHandler`].
#[derive(Debug)]
pub struct PhaseFailure<'a> {
  pub module: &'a str,
  pub phase: &'static str,
  pub error: &'a PhaseError,
  pub recovery: &'static [&'static str],
}

pub trait ErrorHandler {
  fn choose(&mut self, failure: &PhaseFailure<'_>) -> ErrorChoice;

  /// Asked before entering a phase that requires confirmation.
  fn confirm(&mut self, _question: &str) -> bool {
    true
  }
}

/// Gives up on every failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl ErrorHandler for NonInteractive {
  fn choose(&mut self, _failure: &PhaseFailure<'_>) -> ErrorChoice {
    ErrorChoice::Poison
  }

  fn confirm(&mut self, _question: &str) -> bool {
    false
  }
}

#[derive(Debug)]
pub enum RunOutcome {
  /// Every phase completed.
  Built,
  /// The pipeline ended early: the module is up to date or a phase said
  /// there was nothing left to do.
  Skipped,
  Failed { phase: &'static str, error: PhaseError },
}

impl RunOutcome {
  pub fn is_failure(&self) -> bool {
    matches!(self, RunOutcome::Failed { .. })
  }
}

/// Drives `module` through its phases.
///
/// `dependencies` are its transitive hard dependencies, consulted by the
/// `updated-deps` build policy.
pub fn run_module(
  module: &Module,
  dependencies: &[String],
  ctx: &mut BuildContext,
  handler: &mut dyn ErrorHandler,
) -> RunOutcome {
  let specs = module.phases();
  let plan: Vec<PhaseSpec> = specs.iter().copied().filter(PhaseSpec::in_plan).collect();
  let position = |name: &str| plan.iter().position(|p| p.name == name);

  let mut idx = 0;
  let mut pending: Option<PhaseSpec> = None;
  let mut last: Option<&'static str> = None;

  loop {
    wait_while_suspended(ctx);

    let spec = match pending.take() {
      Some(spec) => spec,
      None => match plan.get(idx) {
        Some(spec) => *spec,
        None => return RunOutcome::Built,
      },
    };
    let completes = spec.resumes_as.unwrap_or(spec.name);
    let next_idx = position(completes).map_or(idx + 1, |p| p + 1);
    let checkpoint = spec.policy_checkpoint || position(completes).is_some_and(|p| plan[p].policy_checkpoint);

    if spec.in_plan() && module.kind.should_skip(spec.name, module, ctx, last) {
      debug!(module = %module.name, phase = %spec.name, "skipped");
      last = Some(spec.name);
      idx = next_idx;
      if checkpoint && up_to_date(module, dependencies, ctx) {
        return RunOutcome::Skipped;
      }
      continue;
    }

    ctx.notify(|o| o.start_phase(&module.name, spec.name));
    let result = module.kind.run_phase(spec.name, module, ctx).and_then(|flow| match flow {
      Flow::SkipToPhase(target) if position(target).is_none() => Err(PhaseError::state(format!(
        "phase '{}' asked to continue at unknown phase '{}'",
        spec.name, target
      ))),
      flow => Ok(flow),
    });
    ctx.notify(|o| o.end_phase(&module.name, spec.name, result.as_ref().err()));

    let error = match result {
      Ok(Flow::Next) => {
        last = Some(spec.name);
        idx = next_idx;
        if checkpoint && up_to_date(module, dependencies, ctx) {
          return RunOutcome::Skipped;
        }
        continue;
      }
      Ok(Flow::SkipToPhase(target)) => {
        debug!(module = %module.name, from = %spec.name, to = %target, "skipping ahead");
        last = Some(spec.name);
        idx = position(target).unwrap_or(next_idx);
        continue;
      }
      Ok(Flow::SkipToEnd) => return RunOutcome::Skipped,
      Err(error) => error,
    };

    error!(module = %module.name, phase = %spec.name, error = %error, "phase failed");
    loop {
      let choice = handler.choose(&PhaseFailure {
        module: &module.name,
        phase: spec.name,
        error: &error,
        recovery: spec.recovery,
      });
      match choice {
        ErrorChoice::Retry => {
          if !spec.in_plan() {
            pending = Some(spec);
          }
          break;
        }
        ErrorChoice::Continue => {
          last = Some(spec.name);
          idx = next_idx;
          break;
        }
        ErrorChoice::Jump(target) => {
          let Some(target) = specs
            .iter()
            .find(|s| s.name == target && spec.recovery.contains(&s.name))
          else {
            warn!(module = %module.name, phase = %target, "not a recovery phase of {}", spec.name);
            continue;
          };
          if target.requires_confirmation
            && !handler.confirm(&format!("Really run {} for {}?", target.name, module.name))
          {
            continue;
          }
          match position(target.name) {
            Some(p) if target.in_plan() => idx = p,
            _ => pending = Some(*target),
          }
          last = Some(spec.name);
          break;
        }
        ErrorChoice::Shell => {
          let config = ctx.config();
          let dir = [module.builddir(config), module.srcdir(config), config.checkoutroot.clone()]
            .into_iter()
            .find(|d| d.is_dir())
            .unwrap_or_else(std::env::temp_dir);
          if let Err(e) = ctx.interactive_shell(&dir) {
            warn!(error = %e, "could not open shell");
          }
        }
        ErrorChoice::Poison => {
          return RunOutcome::Failed {
            phase: spec.name,
            error,
          };
        }
      }
    }
  }
}

fn up_to_date(module: &Module, dependencies: &[String], ctx: &mut BuildContext) -> bool {
  if !policy::is_up_to_date(module, dependencies, ctx.config(), &ctx.packagedb) {
    return false;
  }
  ctx.message(&format!(
    "Skipping {} (installed version is up to date, policy {})",
    module.name,
    ctx.config().build_policy
  ));
  true
}

fn wait_while_suspended(ctx: &BuildContext) {
  while ctx.is_suspended() {
    std::thread::sleep(Duration::from_millis(200));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::exec::{CommandError, RecordingExecutor};
  use crate::config::BuildPolicy;
  use crate::util::testutil::{ScriptedHandler, context_with, stub_module, test_config, test_context};
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tempfile::TempDir;

  #[test]
  fn runs_phases_in_declared_order() {
    let temp = TempDir::new().unwrap();
    let (mut ctx, log) = test_context(temp.path());
    let module = stub_module("m", "r1", &[]);

    let outcome = run_module(&module, &[], &mut ctx, &mut NonInteractive);

    assert!(matches!(outcome, RunOutcome::Built));
    assert_eq!(
      log.commands(),
      vec!["stub checkout m", "stub configure m", "stub build m", "stub install m"]
    );
    assert!(ctx.config().prefix.join("m").exists());
  }

  #[test]
  fn skip_predicate_counts_as_completed() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.nonetwork = true;
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(config, executor);

    let outcome = run_module(&stub_module("m", "r1", &[]), &[], &mut ctx, &mut NonInteractive);

    assert!(matches!(outcome, RunOutcome::Built));
    assert_eq!(log.commands(), vec!["stub configure m", "stub build m", "stub install m"]);
  }

  #[test]
  fn updated_policy_stops_after_checkout() {
    let temp = TempDir::new().unwrap();
    let module = stub_module("m", "r1", &[]);
    {
      let (mut ctx, _) = test_context(temp.path());
      assert!(matches!(run_module(&module, &[], &mut ctx, &mut NonInteractive), RunOutcome::Built));
    }

    let mut config = test_config(temp.path());
    config.build_policy = BuildPolicy::Updated;
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(config, executor);
    let before = ctx.packagedb.get("m").cloned();

    let outcome = run_module(&module, &[], &mut ctx, &mut NonInteractive);

    assert!(matches!(outcome, RunOutcome::Skipped));
    assert_eq!(log.commands(), vec!["stub checkout m"]);
    assert_eq!(ctx.packagedb.get("m").cloned(), before);
  }

  #[test]
  fn non_interactive_failure_poisons() {
    let temp = TempDir::new().unwrap();
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(test_config(temp.path()), executor.fail_on("stub configure"));

    let outcome = run_module(&stub_module("m", "r1", &[]), &[], &mut ctx, &mut NonInteractive);

    assert!(matches!(outcome, RunOutcome::Failed { phase: "configure", .. }));
    assert_eq!(log.commands(), vec!["stub checkout m", "stub configure m"]);
    assert!(ctx.packagedb.get("m").is_none());
  }

  #[test]
  fn retry_reruns_failed_phase() {
    let temp = TempDir::new().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let (executor, log) = RecordingExecutor::new();
    let executor = executor.on("stub build", move |cmd| {
      if seen.fetch_add(1, Ordering::SeqCst) == 0 {
        return Err(CommandError::Failed {
          command: cmd.command.clone(),
          code: Some(2),
        });
      }
      Ok(())
    });
    let mut ctx = context_with(test_config(temp.path()), executor);
    let mut handler = ScriptedHandler::new([ErrorChoice::Retry]);

    let outcome = run_module(&stub_module("m", "r1", &[]), &[], &mut ctx, &mut handler);

    assert!(matches!(outcome, RunOutcome::Built));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(handler.failures, vec!["m:build"]);
    assert_eq!(log.commands().iter().filter(|c| *c == "stub build m").count(), 2);
  }

  #[test]
  fn continue_ignores_the_error() {
    let temp = TempDir::new().unwrap();
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(test_config(temp.path()), executor.fail_on("stub build"));
    let mut handler = ScriptedHandler::new([ErrorChoice::Continue]);

    let outcome = run_module(&stub_module("m", "r1", &[]), &[], &mut ctx, &mut handler);

    assert!(matches!(outcome, RunOutcome::Built));
    assert_eq!(log.commands().last().map(String::as_str), Some("stub install m"));
  }

  #[test]
  fn jump_to_out_of_band_phase_resumes_after_its_anchor() {
    let temp = TempDir::new().unwrap();
    let fails = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&fails);
    let (executor, log) = RecordingExecutor::new();
    let executor = executor.on("stub configure", move |cmd| {
      if seen.fetch_add(1, Ordering::SeqCst) == 0 {
        return Err(CommandError::Failed {
          command: cmd.command.clone(),
          code: Some(1),
        });
      }
      Ok(())
    });
    let mut ctx = context_with(test_config(temp.path()), executor);
    let mut handler = ScriptedHandler::new([ErrorChoice::Jump("force_checkout".into())]);

    let outcome = run_module(&stub_module("m", "r1", &[]), &[], &mut ctx, &mut handler);

    assert!(matches!(outcome, RunOutcome::Built));
    assert_eq!(handler.confirmations, 1);
    assert_eq!(
      log.commands(),
      vec![
        "stub checkout m",
        "stub configure m",
        "stub force_checkout m",
        "stub configure m",
        "stub build m",
        "stub install m",
      ]
    );
  }

  #[test]
  fn jump_outside_recovery_list_is_refused() {
    let temp = TempDir::new().unwrap();
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(test_config(temp.path()), executor.fail_on("stub build"));
    let mut handler = ScriptedHandler::new([ErrorChoice::Jump("install".into()), ErrorChoice::Poison]);

    let outcome = run_module(&stub_module("m", "r1", &[]), &[], &mut ctx, &mut handler);

    assert!(matches!(outcome, RunOutcome::Failed { phase: "build", .. }));
    assert_eq!(handler.failures.len(), 2);
    assert!(!log.contains("stub install"));
  }

  #[test]
  fn declined_confirmation_asks_again() {
    let temp = TempDir::new().unwrap();
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(test_config(temp.path()), executor.fail_on("stub configure"));
    let mut handler =
      ScriptedHandler::new([ErrorChoice::Jump("force_checkout".into()), ErrorChoice::Poison]).declining();

    let outcome = run_module(&stub_module("m", "r1", &[]), &[], &mut ctx, &mut handler);

    assert!(outcome.is_failure());
    assert!(!log.contains("force_checkout"));
  }

  #[test]
  fn shell_choice_opens_shell_then_asks_again() {
    let temp = TempDir::new().unwrap();
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(test_config(temp.path()), executor.fail_on("stub build"));
    let mut handler = ScriptedHandler::new([ErrorChoice::Shell, ErrorChoice::Poison]);

    let outcome = run_module(&stub_module("m", "r1", &[]), &[], &mut ctx, &mut handler);

    assert!(outcome.is_failure());
    assert!(log.contains("$SHELL"));
    assert_eq!(handler.failures, vec!["m:build", "m:build"]);
  }
}
