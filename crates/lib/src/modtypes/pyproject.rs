//! PEP 517 projects: `python3 -m build` makes a wheel, `python3 -m installer`
//! unpacks it.

use std::path::PathBuf;

use crate::build::context::BuildContext;
use crate::build::exec::Cmd;
use crate::build::install;
use crate::config::Config;
use crate::descriptor::Element;
use crate::modtypes::common;
use crate::module::phase::{
  self, BUILD, CHECKOUT, FORCE_CHECKOUT, Flow, INSTALL, Phase, PhaseError, PhaseResult, PhaseSpec,
};
use crate::module::registry::ParseContext;
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PyProject {
  pub skip_install: bool,
}

const PHASES: &[Phase<PyProject>] = &[
  Phase {
    skip: Some(common::skip_checkout),
    recovery: &[FORCE_CHECKOUT],
    policy_checkpoint: true,
    ..Phase::new(CHECKOUT, common::checkout)
  },
  Phase {
    recovery: &[FORCE_CHECKOUT],
    requires_confirmation: true,
    resumes_as: Some(CHECKOUT),
    ..Phase::new(FORCE_CHECKOUT, common::force_checkout)
  },
  Phase {
    skip: Some(common::skip_nobuild),
    recovery: &[FORCE_CHECKOUT],
    ..Phase::new(BUILD, build)
  },
  Phase {
    skip: Some(skip_install),
    recovery: &[FORCE_CHECKOUT, BUILD],
    ..Phase::new(INSTALL, install_phase)
  },
];

fn build(backend: &PyProject, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  let config = ctx.config();
  let srcdir = module.srcdir(config);
  let builddir = backend.builddir(module, config);
  let env = module.env(config);
  if builddir.is_dir() {
    std::fs::remove_dir_all(&builddir)
      .map_err(|e| PhaseError::io(format!("failed to clear {}", builddir.display()), e))?;
  }
  common::ensure_dir(&builddir)?;
  let cmd = Cmd::argv([
    "python3".to_string(),
    "-m".into(),
    "build".into(),
    "--wheel".into(),
    "--no-isolation".into(),
    "--outdir".into(),
    builddir.display().to_string(),
    srcdir.display().to_string(),
  ]);
  ctx.execute(&cmd, &srcdir, &env)?;
  Ok(Flow::Next)
}

fn skip_install(backend: &PyProject, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), backend.skip_install)
}

fn install_phase(backend: &PyProject, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |ctx, destdir| {
    let config = ctx.config();
    let builddir = backend.builddir(module, config);
    let wheel = common::find_wheel(&builddir)?;
    let mut argv = vec!["python3".to_string(), "-m".into(), "installer".into()];
    if let Some(d) = destdir {
      argv.push("--destdir".into());
      argv.push(d.display().to_string());
    }
    argv.push("--prefix".into());
    argv.push(config.prefix.display().to_string());
    argv.push(wheel.display().to_string());
    let env = module.env(config);
    ctx.execute(&Cmd::Argv(argv), &builddir, &env)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for PyProject {
  fn type_name(&self) -> &'static str {
    "pyproject"
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

  fn builddir(&self, module: &Module, config: &Config) -> PathBuf {
    common::builddir(module, module.srcdir(config), config, true, true)
  }

  fn supports_install_destdir(&self) -> bool {
    true
  }

  fn write_descriptor(&self, element: &mut Element) {
    common::bool_attr_unless(element, "skip-install", self.skip_install, false);
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let kind = PyProject {
    skip_install: element.bool_attr("skip-install", false)?,
  };
  ctx.module(element, Box::new(kind))
}
