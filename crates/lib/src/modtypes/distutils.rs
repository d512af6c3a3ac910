//! Python `setup.py` modules.

use std::path::PathBuf;

use crate::build::context::BuildContext;
use crate::build::exec::{Cmd, quote_path};
use crate::build::install;
use crate::config::Config;
use crate::descriptor::Element;
use crate::modtypes::common;
use crate::module::phase::{
  self, BUILD, CHECK, CHECKOUT, FORCE_CHECKOUT, Flow, INSTALL, Phase, PhaseResult, PhaseSpec,
};
use crate::module::registry::ParseContext;
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distutils {
  pub supports_non_srcdir_builds: bool,
  pub python3: bool,
}

impl Default for Distutils {
  fn default() -> Self {
    Self {
      supports_non_srcdir_builds: true,
      python3: true,
    }
  }
}

const PHASES: &[Phase<Distutils>] = &[
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
    skip: Some(common::skip_check),
    recovery: &[FORCE_CHECKOUT],
    ..Phase::new(CHECK, check)
  },
  Phase {
    skip: Some(skip_install),
    recovery: &[FORCE_CHECKOUT],
    ..Phase::new(INSTALL, install_phase)
  },
];

impl Distutils {
  fn python(&self) -> &'static str {
    if self.python3 { "python3" } else { "python" }
  }

  /// `--build-base <dir>` when building outside the source tree.
  fn build_base(&self, module: &Module, config: &Config) -> Option<String> {
    let srcdir = module.srcdir(config);
    let builddir = self.builddir(module, config);
    (builddir != srcdir).then(|| format!("--build-base {}", quote_path(&builddir)))
  }

  fn setup(&self, args: &[&str]) -> Cmd {
    let mut parts = vec![self.python(), "setup.py"];
    parts.extend_from_slice(args);
    Cmd::shell(common::command_line(&parts))
  }
}

fn build(backend: &Distutils, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  let config = ctx.config();
  let base = backend.build_base(module, config).unwrap_or_default();
  let cmd = backend.setup(&["build", &base]);
  let srcdir = module.srcdir(config);
  let env = module.env(config);
  ctx.execute(&cmd, &srcdir, &env)?;
  Ok(Flow::Next)
}

fn check(backend: &Distutils, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  let cmd = backend.setup(&["test"]);
  let srcdir = module.srcdir(ctx.config());
  common::run_check(module, ctx, &cmd, &srcdir)
}

fn skip_install(_: &Distutils, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), false)
}

fn install_phase(backend: &Distutils, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |ctx, destdir| {
    let config = ctx.config();
    let mut args: Vec<String> = Vec::new();
    if let Some(base) = backend.build_base(module, config) {
      args.push("build".to_string());
      args.push(base);
    }
    args.push("install".to_string());
    args.push(format!("--prefix {}", quote_path(&config.prefix)));
    if let Some(d) = destdir {
      args.push(format!("--root {}", quote_path(d)));
    }
    let refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let cmd = backend.setup(&refs);
    let srcdir = module.srcdir(config);
    let env = module.env(config);
    ctx.execute(&cmd, &srcdir, &env)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Distutils {
  fn type_name(&self) -> &'static str {
    "distutils"
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
    common::builddir(module, module.srcdir(config), config, self.supports_non_srcdir_builds, false)
  }

  fn supports_install_destdir(&self) -> bool {
    true
  }

  fn write_descriptor(&self, element: &mut Element) {
    common::bool_attr_unless(element, "supports-non-srcdir-builds", self.supports_non_srcdir_builds, true);
    common::bool_attr_unless(element, "python3", self.python3, true);
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let kind = Distutils {
    supports_non_srcdir_builds: element.bool_attr("supports-non-srcdir-builds", true)?,
    python3: element.bool_attr("python3", true)?,
  };
  ctx.module(element, Box::new(kind))
}
