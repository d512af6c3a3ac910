//! Test helpers: an isolated build context and a scriptable stub backend.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use crate::build::context::BuildContext;
use crate::build::exec::{Cmd, CommandLog, RecordingExecutor};
use crate::build::install;
use crate::build::runner::{ErrorChoice, ErrorHandler, PhaseFailure};
use crate::config::Config;
use crate::lock::LockWait;
use crate::module::phase::{
  self, BUILD, CHECKOUT, CONFIGURE, FORCE_CHECKOUT, Flow, INSTALL, Phase, PhaseResult, PhaseSpec,
};
use crate::module::branch::LocalBranchFactory;
use crate::module::registry::{ParseContext, TypeRegistry};
use crate::module::{Module, ModuleType};
use crate::packagedb::PackageDb;
use crate::util::fileutils::rebase_under;

/// Parses a single module element with the built-in backends.
pub fn parse_module(xml: &str, config: &Config) -> Module {
  let element = crate::descriptor::parse_str(xml).unwrap();
  let repositories = std::collections::BTreeMap::new();
  let ctx = ParseContext {
    config,
    repositories: &repositories,
    default_repo: None,
    branch_factory: &LocalBranchFactory,
  };
  TypeRegistry::with_builtins().parse(&element, &ctx).unwrap()
}

/// Creates `relative` with `contents` under the staged prefix of a command's
/// `DESTDIR`, the way a real install would.
pub fn stage_file(destdir: &Path, prefix: &Path, relative: &str, contents: &str) {
  let path = rebase_under(destdir, prefix).join(relative);
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, contents).unwrap();
}

/// Configuration with every path under `root`.
pub fn test_config(root: &Path) -> Config {
  let mut config = Config::with_state_dir(root.to_path_buf());
  config.jobs = 2;
  config
}

pub fn context_with(config: Config, executor: RecordingExecutor) -> BuildContext {
  let packagedb = PackageDb::open(&config.state_dir, &config.prefix, LockWait::from_secs(10)).unwrap();
  BuildContext::new(Arc::new(config), packagedb, Box::new(executor))
}

/// A context under `root` that records commands instead of running them.
pub fn test_context(root: &Path) -> (BuildContext, CommandLog) {
  let (executor, log) = RecordingExecutor::new();
  (context_with(test_config(root), executor), log)
}

/// Backend that runs `stub <phase> <module>` for each phase. Its install
/// writes a file named after the module into the staged prefix.
#[derive(Debug)]
pub struct Stub {
  pub revision: String,
  pub destdir: bool,
}

const STUB_PHASES: &[Phase<Stub>] = &[
  Phase {
    skip: Some(skip_checkout),
    recovery: &[FORCE_CHECKOUT],
    policy_checkpoint: true,
    ..Phase::new(CHECKOUT, checkout)
  },
  Phase {
    requires_confirmation: true,
    resumes_as: Some(CHECKOUT),
    ..Phase::new(FORCE_CHECKOUT, force_checkout)
  },
  Phase {
    recovery: &[FORCE_CHECKOUT, CONFIGURE],
    ..Phase::new(CONFIGURE, configure)
  },
  Phase {
    recovery: &[CONFIGURE],
    ..Phase::new(BUILD, build)
  },
  Phase {
    recovery: &[CONFIGURE],
    ..Phase::new(INSTALL, install_phase)
  },
];

fn run(module: &Module, ctx: &mut BuildContext, phase: &str) -> PhaseResult {
  let cwd = ctx.config().checkoutroot.clone();
  ctx.execute(&Cmd::argv(["stub", phase, module.name.as_str()]), &cwd, &[])?;
  Ok(Flow::Next)
}

fn skip_checkout(_: &Stub, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  ctx.config().nonetwork
}

fn checkout(_: &Stub, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  run(module, ctx, CHECKOUT)
}

fn force_checkout(_: &Stub, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  run(module, ctx, FORCE_CHECKOUT)
}

fn configure(_: &Stub, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  run(module, ctx, CONFIGURE)
}

fn build(_: &Stub, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  run(module, ctx, BUILD)
}

fn install_phase(_: &Stub, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  install::install(module, ctx, |ctx, destdir| {
    run(module, ctx, INSTALL)?;
    if let Some(destdir) = destdir {
      let staged = rebase_under(destdir, &ctx.config().prefix);
      std::fs::create_dir_all(&staged).map_err(|e| phase::PhaseError::io("staging", e))?;
      std::fs::write(staged.join(&module.name), &module.name).map_err(|e| phase::PhaseError::io("staging", e))?;
    }
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Stub {
  fn type_name(&self) -> &'static str {
    "stub"
  }

  fn phase_specs(&self) -> Vec<PhaseSpec> {
    phase::specs(STUB_PHASES)
  }

  fn should_skip(&self, name: &str, module: &Module, ctx: &BuildContext, last: Option<&str>) -> bool {
    phase::should_skip(STUB_PHASES, self, name, module, ctx, last)
  }

  fn run_phase(&self, name: &str, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
    phase::dispatch(STUB_PHASES, self, name, module, ctx)
  }

  fn revision(&self, _module: &Module) -> Option<String> {
    Some(self.revision.clone()).filter(|r| !r.is_empty())
  }

  fn supports_install_destdir(&self) -> bool {
    self.destdir
  }

  fn needs_branch(&self) -> bool {
    false
  }
}

pub fn stub_module(name: &str, revision: &str, deps: &[&str]) -> Module {
  let mut module = Module::new(
    name,
    Box::new(Stub {
      revision: revision.to_string(),
      destdir: true,
    }),
  );
  module.dependencies = deps.iter().map(|d| d.to_string()).collect();
  module
}

/// A stub that installs in place, without staging.
pub fn in_place_module(name: &str) -> Module {
  Module::new(
    name,
    Box::new(Stub {
      revision: String::new(),
      destdir: false,
    }),
  )
}

/// Answers the error menu from a fixed script, then poisons.
#[derive(Debug, Default)]
pub struct ScriptedHandler {
  choices: VecDeque<ErrorChoice>,
  decline: bool,
  /// `module:phase` of every failure presented.
  pub failures: Vec<String>,
  pub confirmations: usize,
}

impl ScriptedHandler {
  pub fn new(choices: impl IntoIterator<Item = ErrorChoice>) -> Self {
    Self {
      choices: choices.into_iter().collect(),
      ..Default::default()
    }
  }

  pub fn declining(mut self) -> Self {
    self.decline = true;
    self
  }
}

impl ErrorHandler for ScriptedHandler {
  fn choose(&mut self, failure: &PhaseFailure<'_>) -> ErrorChoice {
    self.failures.push(format!("{}:{}", failure.module, failure.phase));
    self.choices.pop_front().unwrap_or(ErrorChoice::Poison)
  }

  fn confirm(&mut self, _question: &str) -> bool {
    self.confirmations += 1;
    !self.decline
  }
}
