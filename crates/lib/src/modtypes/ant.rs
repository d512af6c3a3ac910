//! Apache Ant modules. Ant has no install convention, so installing only
//! records the module.

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
use crate::module::systemdeps::find_program;
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ant {
  pub supports_non_srcdir_builds: bool,
}

const PHASES: &[Phase<Ant>] = &[
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
    ..Phase::new(INSTALL, install_phase)
  },
];

/// `$ANT`, or `ant`.
fn ant_program() -> String {
  std::env::var("ANT").ok().filter(|a| !a.is_empty()).unwrap_or_else(|| "ant".to_string())
}

fn build(_: &Ant, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  let config = ctx.config();
  let ant = ant_program();
  if find_program(&ant, &config.prefix).is_none() {
    return Err(PhaseError::state(format!("missing ant build tool '{}'", ant)));
  }
  let srcdir = module.srcdir(config);
  let env = module.env(config);
  ctx.execute(&Cmd::argv([ant]), &srcdir, &env)?;
  Ok(Flow::Next)
}

fn skip_install(_: &Ant, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), false)
}

fn install_phase(_: &Ant, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |_, _| Ok(()))?;
  Ok(Flow::Next)
}

impl ModuleType for Ant {
  fn type_name(&self) -> &'static str {
    "ant"
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

  fn write_descriptor(&self, element: &mut Element) {
    common::bool_attr_unless(element, "supports-non-srcdir-builds", self.supports_non_srcdir_builds, false);
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let kind = Ant {
    supports_non_srcdir_builds: element.bool_attr("supports-non-srcdir-builds", false)?,
  };
  ctx.module(element, Box::new(kind))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::exec::RecordingExecutor;
  use crate::build::runner::{NonInteractive, RunOutcome, run_module};
  use crate::util::testutil::{context_with, parse_module, test_config};
  use serial_test::serial;
  use std::fs;
  use tempfile::TempDir;

  fn fake_ant(config: &Config) -> PathBuf {
    let bin = config.prefix.join("bin");
    fs::create_dir_all(&bin).unwrap();
    let ant = bin.join("fake-ant");
    fs::write(&ant, "#!/bin/sh\n").unwrap();
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      fs::set_permissions(&ant, fs::Permissions::from_mode(0o755)).unwrap();
    }
    ant
  }

  #[test]
  #[serial]
  fn builds_in_source_and_records_revision() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    fs::create_dir_all(config.checkoutroot.join("jar")).unwrap();
    fake_ant(&config);
    let module = parse_module(r#"<ant id="jar"><branch revision="1.2"/></ant>"#, &config);
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(config, executor);

    let outcome = temp_env::with_var("ANT", Some("fake-ant"), || {
      run_module(&module, &[], &mut ctx, &mut NonInteractive)
    });

    assert!(matches!(outcome, RunOutcome::Built), "{:?}", outcome);
    assert_eq!(log.commands(), vec!["fake-ant"]);
    let entry = ctx.packagedb.get("jar").unwrap();
    assert_eq!(entry.revision, "1.2");
    assert_eq!(entry.manifest, None);
  }

  #[test]
  #[serial]
  fn missing_tool_fails_build() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    fs::create_dir_all(config.checkoutroot.join("jar")).unwrap();
    let module = parse_module(r#"<ant id="jar"/>"#, &config);
    let (executor, log) = RecordingExecutor::new();
    let mut ctx = context_with(config, executor);

    let outcome = temp_env::with_var("ANT", Some("no-such-ant-binary"), || {
      run_module(&module, &[], &mut ctx, &mut NonInteractive)
    });

    assert!(matches!(outcome, RunOutcome::Failed { phase: "build", .. }));
    assert!(log.commands().is_empty());
  }
}
