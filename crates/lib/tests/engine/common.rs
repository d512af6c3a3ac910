//! Shared helpers: an isolated state directory and a scripted backend.

use std::path::PathBuf;
use std::sync::Arc;

use modbuild_lib::build::exec::{Cmd, CommandLog, RecordingExecutor};
use modbuild_lib::build::{BuildContext, BuildSummary, NonInteractive, install};
use modbuild_lib::config::Config;
use modbuild_lib::descriptor::Element;
use modbuild_lib::lock::LockWait;
use modbuild_lib::module::phase::{
  self, BUILD, CHECKOUT, CONFIGURE, Flow, INSTALL, Phase, PhaseError, PhaseResult, PhaseSpec,
};
use modbuild_lib::module::registry::{ParseContext, TypeRegistry};
use modbuild_lib::module::{Module, ModuleType};
use modbuild_lib::moduleset::{ModuleSet, ModuleSetError, ModuleSetLoader, SelectOptions};
use modbuild_lib::packagedb::PackageDb;
use modbuild_lib::util::fileutils::rebase_under;
use tempfile::TempDir;

/// Runs `scripted <phase> <module>` for every phase; its install writes the
/// files named in the `files` attribute into the staged prefix.
#[derive(Debug)]
pub struct Scripted {
  revision: String,
  files: Vec<String>,
}

const PHASES: &[Phase<Scripted>] = &[
  Phase {
    skip: Some(skip_checkout),
    policy_checkpoint: true,
    ..Phase::new(CHECKOUT, checkout)
  },
  Phase::new(CONFIGURE, configure),
  Phase::new(BUILD, build),
  Phase::new(INSTALL, install_phase),
];

fn run(module: &Module, ctx: &mut BuildContext, phase: &str) -> PhaseResult {
  let cwd = ctx.config().checkoutroot.clone();
  ctx.execute(&Cmd::argv(["scripted", phase, module.name.as_str()]), &cwd, &[])?;
  Ok(Flow::Next)
}

fn skip_checkout(_: &Scripted, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  ctx.config().nonetwork
}

fn checkout(_: &Scripted, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  run(module, ctx, CHECKOUT)
}

fn configure(_: &Scripted, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  run(module, ctx, CONFIGURE)
}

fn build(_: &Scripted, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  run(module, ctx, BUILD)
}

fn install_phase(backend: &Scripted, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  install::install(module, ctx, |ctx, destdir| {
    run(module, ctx, INSTALL)?;
    let Some(destdir) = destdir else {
      return Ok(());
    };
    let staged = rebase_under(destdir, &ctx.config().prefix);
    for file in &backend.files {
      let path = staged.join(file);
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PhaseError::io("staging", e))?;
      }
      std::fs::write(&path, &module.name).map_err(|e| PhaseError::io("staging", e))?;
    }
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Scripted {
  fn type_name(&self) -> &'static str {
    "scripted"
  }

  fn phase_specs(&self) -> Vec<PhaseSpec> {
    phase::specs(PHASES)
  }

  fn should_skip(&self, name: &str, module: &Module, ctx: &BuildContext, last: Option<&str>) -> bool {
    phase::should_skip(PHASES, self, name, module, ctx, last)
  }

  fn run_phase(&self, name: &str, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
    phase::dispatch(PHASES, self, name, module, ctx)
  }

  fn revision(&self, _module: &Module) -> Option<String> {
    Some(self.revision.clone()).filter(|r| !r.is_empty())
  }

  fn supports_install_destdir(&self) -> bool {
    true
  }

  fn needs_branch(&self) -> bool {
    false
  }
}

fn parse_scripted(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let kind = Scripted {
    revision: element.attr("revision").unwrap_or_default().to_string(),
    files: element
      .attr("files")
      .unwrap_or_default()
      .split_whitespace()
      .map(str::to_string)
      .collect(),
  };
  ctx.module(element, Box::new(kind))
}

/// The built-in backends plus `<scripted>`.
pub fn registry() -> TypeRegistry {
  let mut registry = TypeRegistry::with_builtins();
  registry.register("scripted", parse_scripted);
  registry
}

/// Isolated state directory, prefix and checkout root.
pub struct TestEnv {
  pub temp: TempDir,
  pub config: Config,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let mut config = Config::with_state_dir(temp.path().to_path_buf());
    config.jobs = 2;
    Self { temp, config }
  }

  pub fn prefix_path(&self, relative: &str) -> PathBuf {
    self.config.prefix.join(relative)
  }

  pub fn load(&self, xml: &str) -> Result<ModuleSet, ModuleSetError> {
    let registry = registry();
    ModuleSetLoader::new(&registry, &self.config).load_str(xml, self.temp.path())
  }

  pub fn packagedb(&self) -> PackageDb {
    PackageDb::open(&self.config.state_dir, &self.config.prefix, LockWait::from_secs(10)).unwrap()
  }

  pub fn context(&self, executor: RecordingExecutor) -> BuildContext {
    BuildContext::new(Arc::new(self.config.clone()), self.packagedb(), Box::new(executor))
  }

  /// Builds `seeds` and their dependencies, giving up on every failure.
  pub fn build_with(
    &self,
    set: &ModuleSet,
    seeds: &[&str],
    executor: RecordingExecutor,
  ) -> (BuildSummary, BuildContext) {
    let modules = set.get_module_list(seeds, &SelectOptions::default()).unwrap();
    let mut ctx = self.context(executor);
    let summary = modbuild_lib::build::build(set, &modules, &mut ctx, &mut NonInteractive).unwrap();
    (summary, ctx)
  }

  pub fn build(&self, set: &ModuleSet, seeds: &[&str]) -> (BuildSummary, BuildContext, CommandLog) {
    let (executor, log) = RecordingExecutor::new();
    let (summary, ctx) = self.build_with(set, seeds, executor);
    (summary, ctx, log)
  }
}

/// A one-module moduleset.
pub fn single(name: &str, revision: &str, files: &str) -> String {
  format!(
    r#"<moduleset><scripted id="{}" revision="{}" files="{}"/></moduleset>"#,
    name, revision, files
  )
}
