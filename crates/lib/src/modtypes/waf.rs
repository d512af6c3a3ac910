//! Waf modules.

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
pub struct Waf {
  pub waf_command: String,
}

impl Default for Waf {
  fn default() -> Self {
    Self {
      waf_command: "./waf".to_string(),
    }
  }
}

const PHASES: &[Phase<Waf>] = &[
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

impl Waf {
  pub fn configure_cmd(&self, config: &Config) -> String {
    let mut parts = vec![self.waf_command.clone(), "configure --prefix".to_string(), quote_path(&config.prefix)];
    if config.use_lib64 {
      parts.push(format!("--libdir {}", quote_path(&config.prefix.join("lib64"))));
    }
    common::command_line(&parts)
  }

  fn waf(&self, args: &[&str]) -> Cmd {
    let mut parts = vec![self.waf_command.as_str()];
    parts.extend_from_slice(args);
    Cmd::shell(common::command_line(&parts))
  }

  fn run(&self, module: &Module, ctx: &mut BuildContext, cmd: Cmd) -> PhaseResult {
    let config = ctx.config();
    let srcdir = module.srcdir(config);
    let env = module.env(config);
    ctx.execute(&cmd, &srcdir, &env)?;
    Ok(Flow::Next)
  }
}

fn skip_configure(_: &Waf, module: &Module, ctx: &BuildContext, last: Option<&str>) -> bool {
  let config = ctx.config();
  if config.nobuild {
    return true;
  }
  if common::reentering(last) || config.alwaysautogen {
    return false;
  }
  module.srcdir(config).join(".lock-wscript").is_file()
}

fn configure(backend: &Waf, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Configuring", &module.name);
  let cmd = Cmd::shell(backend.configure_cmd(ctx.config()));
  backend.run(module, ctx, cmd)
}

fn clean(backend: &Waf, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Cleaning", &module.name);
  backend.run(module, ctx, backend.waf(&["clean"]))
}

fn build(backend: &Waf, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  let jobs = common::with_jobs("", module, ctx.config());
  backend.run(module, ctx, backend.waf(&["build", &jobs]))
}

fn check(backend: &Waf, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  let srcdir = module.srcdir(ctx.config());
  common::run_check(module, ctx, &backend.waf(&["check"]), &srcdir)
}

fn dist(backend: &Waf, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Creating tarball for", &module.name);
  let target = if ctx.config().makedistcheck { "distcheck" } else { "dist" };
  backend.run(module, ctx, backend.waf(&[target]))
}

fn skip_install(_: &Waf, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), false)
}

fn install_phase(backend: &Waf, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |ctx, destdir| {
    let cmd = match destdir {
      Some(d) => backend.waf(&["install", &common::path_arg("--destdir=", d)]),
      None => backend.waf(&["install"]),
    };
    backend.run(module, ctx, cmd)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Waf {
  fn type_name(&self) -> &'static str {
    "waf"
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

  fn configure_command(&self, _module: &Module, config: &Config) -> Option<String> {
    Some(self.configure_cmd(config))
  }

  fn supports_install_destdir(&self) -> bool {
    true
  }

  fn write_descriptor(&self, element: &mut Element) {
    common::attr_unless(element, "waf-command", &self.waf_command, "./waf");
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let kind = Waf {
    waf_command: element.attr("waf-command").unwrap_or("./waf").to_string(),
  };
  ctx.module(element, Box::new(kind))
}
