//! `autogen.sh`/`configure` + `make` modules.

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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Autotools {
  /// Script run at configure time, relative to the source tree.
  pub autogen_sh: String,
  pub autogenargs: String,
  pub makeargs: String,
  pub supports_non_srcdir_builds: bool,
  pub skip_install: bool,
}

impl Default for Autotools {
  fn default() -> Self {
    Self {
      autogen_sh: "autogen.sh".to_string(),
      autogenargs: String::new(),
      makeargs: String::new(),
      supports_non_srcdir_builds: true,
      skip_install: false,
    }
  }
}

const PHASES: &[Phase<Autotools>] = &[
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

impl Autotools {
  fn makeargs(&self, module: &Module, config: &Config) -> String {
    let args = common::collect_args(&self.makeargs, &config.module_makeargs, &config.makeargs, &module.name, config);
    common::with_jobs(&args, module, config)
  }

  fn make(&self, module: &Module, config: &Config, target: &str) -> Cmd {
    Cmd::shell(common::command_line(&["make", &self.makeargs(module, config), target]))
  }

  /// The configure invocation, as recorded in the package database.
  pub fn configure_cmd(&self, module: &Module, config: &Config) -> String {
    let srcdir = module.srcdir(config);
    let builddir = self.builddir(module, config);
    let script = if builddir != srcdir {
      quote_path(&srcdir.join(&self.autogen_sh))
    } else {
      format!("./{}", self.autogen_sh)
    };

    let mut parts = vec![script, "--prefix".to_string(), quote_path(&config.prefix)];
    if config.use_lib64 {
      parts.push("--libdir '${exec_prefix}/lib64'".to_string());
    }
    let args = common::collect_args(
      &self.autogenargs,
      &config.module_autogenargs,
      &config.autogenargs,
      &module.name,
      config,
    );
    // Maintainer mode breaks builds from release tarballs.
    let strip_maintainer = self.autogen_sh == "configure";
    parts.extend(
      args
        .split(' ')
        .filter(|t| !(strip_maintainer && *t == "--enable-maintainer-mode"))
        .map(str::to_string),
    );
    common::command_line(&parts)
  }

  fn run_make(&self, module: &Module, ctx: &mut BuildContext, target: &str) -> PhaseResult {
    let config = ctx.config();
    let cmd = self.make(module, config, target);
    let builddir = self.builddir(module, config);
    let env = module.env(config);
    ctx.execute(&cmd, &builddir, &env)?;
    Ok(Flow::Next)
  }
}

fn skip_configure(backend: &Autotools, module: &Module, ctx: &BuildContext, last: Option<&str>) -> bool {
  let config = ctx.config();
  if config.nobuild {
    return true;
  }
  if common::reentering(last) || config.alwaysautogen {
    return false;
  }
  if !backend.builddir(module, config).join("config.status").is_file() {
    return false;
  }
  // A configured tree is reused only when the arguments did not change.
  let current = backend.configure_cmd(module, config);
  ctx
    .packagedb
    .get(&module.name)
    .and_then(|e| e.configure_cmd.as_deref())
    .is_some_and(|recorded| recorded == current)
}

fn configure(backend: &Autotools, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Configuring", &module.name);
  let config = ctx.config();
  let builddir = backend.builddir(module, config);
  let cmd = Cmd::shell(backend.configure_cmd(module, config));
  let env = module.env(config);
  common::ensure_dir(&builddir)?;
  ctx.execute(&cmd, &builddir, &env)?;
  Ok(Flow::Next)
}

fn clean(backend: &Autotools, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Cleaning", &module.name);
  backend.run_make(module, ctx, "clean")
}

fn build(backend: &Autotools, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  backend.run_make(module, ctx, "")
}

fn check(backend: &Autotools, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  let cmd = backend.make(module, ctx.config(), "check");
  let builddir = backend.builddir(module, ctx.config());
  common::run_check(module, ctx, &cmd, &builddir)
}

fn dist(backend: &Autotools, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Creating tarball for", &module.name);
  let target = if ctx.config().makedistcheck { "distcheck" } else { "dist" };
  backend.run_make(module, ctx, target)
}

fn skip_install(backend: &Autotools, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), backend.skip_install)
}

fn install_phase(backend: &Autotools, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |ctx, destdir| {
    let destdir = destdir.map(|d| common::path_arg("DESTDIR=", d)).unwrap_or_default();
    let config = ctx.config();
    let cmd = backend.make(module, config, &format!("install {}", destdir));
    let builddir = backend.builddir(module, config);
    let env = module.env(config);
    ctx.execute(&cmd, &builddir, &env)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Autotools {
  fn type_name(&self) -> &'static str {
    "autotools"
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

  fn configure_command(&self, module: &Module, config: &Config) -> Option<String> {
    Some(self.configure_cmd(module, config))
  }

  fn supports_install_destdir(&self) -> bool {
    true
  }

  fn write_descriptor(&self, element: &mut Element) {
    common::attr_unless(element, "autogen-sh", &self.autogen_sh, "autogen.sh");
    common::attr_unless(element, "autogenargs", &self.autogenargs, "");
    common::attr_unless(element, "makeargs", &self.makeargs, "");
    common::bool_attr_unless(element, "supports-non-srcdir-builds", self.supports_non_srcdir_builds, true);
    common::bool_attr_unless(element, "skip-install", self.skip_install, false);
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let attr = |key: &str| element.attr(key).unwrap_or_default().to_string();
  let kind = Autotools {
    autogen_sh: element.attr("autogen-sh").unwrap_or("autogen.sh").to_string(),
    autogenargs: attr("autogenargs"),
    makeargs: attr("makeargs"),
    supports_non_srcdir_builds: element.bool_attr("supports-non-srcdir-builds", true)?,
    skip_install: element.bool_attr("skip-install", false)?,
  };
  ctx.module(element, Box::new(kind))
}
