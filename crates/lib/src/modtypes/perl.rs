//! Perl `Makefile.PL` modules.

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

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Perl {
  pub makeargs: String,
}

const PHASES: &[Phase<Perl>] = &[
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

impl Perl {
  fn makeargs(&self, module: &Module, config: &Config) -> String {
    common::collect_args(&self.makeargs, &config.module_makeargs, &config.makeargs, &module.name, config)
  }
}

fn build(backend: &Perl, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  let config = ctx.config();
  let args = backend.makeargs(module, config);
  let cmd = Cmd::shell(common::command_line(&[
    "perl Makefile.PL INSTALLDIRS=vendor",
    &common::path_arg("PREFIX=", &config.prefix),
    &args,
    "&& make LD_RUN_PATH=",
    &common::with_jobs(&args, module, config),
  ]));
  let srcdir = module.srcdir(config);
  let env = module.env(config);
  ctx.execute(&cmd, &srcdir, &env)?;
  Ok(Flow::Next)
}

fn skip_install(_: &Perl, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), false)
}

fn install_phase(backend: &Perl, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |ctx, destdir| {
    let config = ctx.config();
    let destdir = destdir.map(|d| common::path_arg("DESTDIR=", d)).unwrap_or_default();
    let cmd = Cmd::shell(common::command_line(&[
      "make install",
      &common::path_arg("PREFIX=", &config.prefix),
      &destdir,
      &backend.makeargs(module, config),
    ]));
    let srcdir = module.srcdir(config);
    let env = module.env(config);
    ctx.execute(&cmd, &srcdir, &env)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Perl {
  fn type_name(&self) -> &'static str {
    "perl"
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

  fn supports_install_destdir(&self) -> bool {
    true
  }

  fn write_descriptor(&self, element: &mut Element) {
    common::attr_unless(element, "makeargs", &self.makeargs, "");
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let kind = Perl {
    makeargs: element.attr("makeargs").unwrap_or_default().to_string(),
  };
  ctx.module(element, Box::new(kind))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::exec::RecordingExecutor;
  use crate::build::runner::{NonInteractive, RunOutcome, run_module};
  use crate::util::testutil::{context_with, parse_module, stage_file, test_config};
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn makefile_pl_then_make_install() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    fs::create_dir_all(config.checkoutroot.join("perl-xml-parser")).unwrap();
    let module = parse_module(r#"<perl id="perl-xml-parser" makeargs="EXPATLIBPATH=/usr/lib"/>"#, &config);
    let destdir = install::destdir_for(&config, "perl-xml-parser");
    let prefix = config.prefix.clone();
    let staged = destdir.clone();
    let (executor, log) = RecordingExecutor::new();
    let executor = executor.on("make install", move |_| {
      stage_file(&staged, &prefix, "share/perl5/XML/Parser.pm", "1;");
      Ok(())
    });
    let mut ctx = context_with(config, executor);

    let outcome = run_module(&module, &[], &mut ctx, &mut NonInteractive);

    assert!(matches!(outcome, RunOutcome::Built), "{:?}", outcome);
    let prefix = ctx.config().prefix.display().to_string();
    assert_eq!(
      log.commands(),
      vec![
        format!(
          "perl Makefile.PL INSTALLDIRS=vendor PREFIX={} EXPATLIBPATH=/usr/lib && make LD_RUN_PATH= EXPATLIBPATH=/usr/lib -j2",
          prefix
        ),
        format!(
          "make install PREFIX={} DESTDIR={} EXPATLIBPATH=/usr/lib",
          prefix,
          destdir.display()
        ),
      ]
    );
  }
}
