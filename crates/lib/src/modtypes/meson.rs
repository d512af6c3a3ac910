//! Meson + ninja modules. Always built outside the source tree.

use std::path::PathBuf;

use crate::build::context::BuildContext;
use crate::build::exec::{Cmd, quote_path};
use crate::build::install;
use crate::config::Config;
use crate::descriptor::Element;
use crate::modtypes::common;
use crate::module::phase::{
  self, BUILD, CHECK, CHECKOUT, CLEAN, CONFIGURE, DIST, FORCE_CHECKOUT, Flow, INSTALL, Phase, PhaseResult, PhaseSpec,
};
use crate::module::registry::ParseContext;
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meson {
  pub mesonargs: String,
  pub ninjaargs: String,
  pub skip_install: bool,
}

const PHASES: &[Phase<Meson>] = &[
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
    skip: Some(skip_configure),
    recovery: &[FORCE_CHECKOUT],
    ..Phase::new(CONFIGURE, configure)
  },
  Phase {
    skip: Some(common::skip_clean),
    recovery: &[FORCE_CHECKOUT, CONFIGURE],
    ..Phase::new(CLEAN, clean)
  },
  Phase {
    skip: Some(common::skip_nobuild),
    recovery: &[FORCE_CHECKOUT, CONFIGURE],
    ..Phase::new(BUILD, build)
  },
  Phase {
    skip: Some(common::skip_check),
    recovery: &[FORCE_CHECKOUT, CONFIGURE],
    ..Phase::new(CHECK, check)
  },
  Phase {
    skip: Some(common::skip_dist),
    recovery: &[FORCE_CHECKOUT, CONFIGURE],
    ..Phase::new(DIST, dist)
  },
  Phase {
    skip: Some(skip_install),
    recovery: &[FORCE_CHECKOUT, CONFIGURE],
    ..Phase::new(INSTALL, install_phase)
  },
];

impl Meson {
  pub fn configure_cmd(&self, module: &Module, config: &Config) -> String {
    let args = common::collect_args(
      &self.mesonargs,
      &config.module_mesonargs,
      &config.mesonargs,
      &module.name,
      config,
    );
    let libdir = if config.use_lib64 { "--libdir lib64" } else { "" };
    common::command_line(&[
      "meson setup --prefix",
      &quote_path(&config.prefix),
      libdir,
      &args,
      &quote_path(&module.srcdir(config)),
    ])
  }

  fn ninja(&self, module: &Module, config: &Config, target: &str) -> Cmd {
    let mut args = common::collect_args(
      &self.ninjaargs,
      &config.module_ninjaargs,
      &config.ninjaargs,
      &module.name,
      config,
    );
    // Ninja runs in parallel on its own; only serial modules pass a job count.
    if !module.supports_parallel_build {
      args = common::with_jobs(&args, module, config);
    }
    Cmd::shell(common::command_line(&["ninja", &args, target]))
  }

  fn run_ninja(&self, module: &Module, ctx: &mut BuildContext, target: &str) -> PhaseResult {
    let config = ctx.config();
    let cmd = self.ninja(module, config, target);
    let builddir = self.builddir(module, config);
    let env = module.env(config);
    ctx.execute(&cmd, &builddir, &env)?;
    Ok(Flow::Next)
  }
}

fn skip_configure(backend: &Meson, module: &Module, ctx: &BuildContext, last: Option<&str>) -> bool {
  let config = ctx.config();
  if config.nobuild {
    return true;
  }
  if common::reentering(last) || config.alwaysautogen {
    return false;
  }
  backend.builddir(module, config).join("meson-private").is_dir()
}

fn configure(backend: &Meson, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Configuring", &module.name);
  let config = ctx.config();
  let builddir = backend.builddir(module, config);
  let cmd = Cmd::shell(backend.configure_cmd(module, config));
  let env = module.env(config);
  common::ensure_dir(&builddir)?;
  ctx.execute(&cmd, &builddir, &env)?;
  Ok(Flow::Next)
}

fn clean(backend: &Meson, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Cleaning", &module.name);
  backend.run_ninja(module, ctx, "clean")
}

fn build(backend: &Meson, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  backend.run_ninja(module, ctx, "")
}

fn check(backend: &Meson, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  let cmd = backend.ninja(module, ctx.config(), "test");
  let builddir = backend.builddir(module, ctx.config());
  common::run_check(module, ctx, &cmd, &builddir)
}

fn dist(backend: &Meson, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Creating tarball for", &module.name);
  backend.run_ninja(module, ctx, "dist")
}

fn skip_install(backend: &Meson, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), backend.skip_install)
}

fn install_phase(backend: &Meson, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |ctx, destdir| {
    let config = ctx.config();
    let cmd = backend.ninja(module, config, "install");
    let builddir = backend.builddir(module, config);
    let mut env = module.env(config);
    if let Some(destdir) = destdir {
      env.push(("DESTDIR".to_string(), destdir.display().to_string()));
    }
    ctx.execute(&cmd, &builddir, &env)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Meson {
  fn type_name(&self) -> &'static str {
    "meson"
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

  fn configure_command(&self, module: &Module, config: &Config) -> Option<String> {
    Some(self.configure_cmd(module, config))
  }

  fn supports_install_destdir(&self) -> bool {
    true
  }

  fn write_descriptor(&self, element: &mut Element) {
    common::attr_unless(element, "mesonargs", &self.mesonargs, "");
    common::attr_unless(element, "ninjaargs", &self.ninjaargs, "");
    common::bool_attr_unless(element, "skip-install", self.skip_install, false);
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let kind = Meson {
    mesonargs: element.attr("mesonargs").unwrap_or_default().to_string(),
    ninjaargs: element.attr("ninjaargs").unwrap_or_default().to_string(),
    skip_install: element.bool_attr("skip-install", false)?,
  };
  ctx.module(element, Box::new(kind))
}
