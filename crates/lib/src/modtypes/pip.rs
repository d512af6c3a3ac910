//! Python packages built into a wheel with pip, then installed from it.

use std::path::PathBuf;

use crate::build::context::BuildContext;
use crate::build::exec::Cmd;
use crate::build::install;
use crate::config::Config;
use crate::descriptor::Element;
use crate::modtypes::common;
use crate::module::phase::{self, BUILD, CHECKOUT, FORCE_CHECKOUT, Flow, INSTALL, Phase, PhaseResult, PhaseSpec};
use crate::module::registry::ParseContext;
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;

const COMMON_PIP_ARGS: &[&str] = &["--disable-pip-version-check", "--no-input", "--no-deps"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pip;

const PHASES: &[Phase<Pip>] = &[
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

fn pip(subcommand: &str, args: Vec<String>) -> Cmd {
  let mut argv = vec!["python3".to_string(), "-m".into(), "pip".into(), subcommand.to_string()];
  argv.extend(COMMON_PIP_ARGS.iter().map(|a| a.to_string()));
  argv.extend(args);
  Cmd::Argv(argv)
}

fn build(backend: &Pip, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  let config = ctx.config();
  let srcdir = module.srcdir(config);
  let builddir = backend.builddir(module, config);
  let env = module.env(config);
  // Stale wheels from an earlier version would be ambiguous at install time.
  if builddir.is_dir() {
    std::fs::remove_dir_all(&builddir)
      .map_err(|e| phase::PhaseError::io(format!("failed to clear {}", builddir.display()), e))?;
  }
  common::ensure_dir(&builddir)?;
  let cmd = pip(
    "wheel",
    vec![
      "--wheel-dir".into(),
      builddir.display().to_string(),
      srcdir.display().to_string(),
    ],
  );
  ctx.execute(&cmd, &srcdir, &env)?;
  Ok(Flow::Next)
}

fn skip_install(_: &Pip, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), false)
}

fn install_phase(backend: &Pip, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |ctx, destdir| {
    let config = ctx.config();
    let builddir = backend.builddir(module, config);
    let wheel = common::find_wheel(&builddir)?;
    let mut args = vec![
      "--no-index".to_string(),
      "--ignore-installed".into(),
      "--prefix".into(),
      config.prefix.display().to_string(),
    ];
    if let Some(d) = destdir {
      args.push("--root".into());
      args.push(d.display().to_string());
    }
    args.push(wheel.display().to_string());
    let env = module.env(config);
    ctx.execute(&pip("install", args), &builddir, &env)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Pip {
  fn type_name(&self) -> &'static str {
    "pip"
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
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  ctx.module(element, Box::new(Pip))
}
