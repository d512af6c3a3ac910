//! Linux kernel modules.
//!
//! One source tree is built once per `<kconfig>`, each configuration in its
//! own `build-<version>` directory under the tree. Everything installs in
//! place under the prefix: the kernel to `boot/`, then modules and headers.

use std::fs;
use std::path::PathBuf;

use crate::build::context::BuildContext;
use crate::build::exec::{Cmd, shell_quote};
use crate::build::install;
use crate::config::Config;
use crate::descriptor::Element;
use crate::modtypes::common;
use crate::module::phase::{
  self, BUILD, CHECKOUT, CLEAN, CONFIGURE, FORCE_CHECKOUT, Flow, INSTALL, MODULES_INSTALL, Phase, PhaseError,
  PhaseResult, PhaseSpec,
};
use crate::module::registry::ParseContext;
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;

const HEADERS_INSTALL: &str = "headers_install";

/// A kernel configuration to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KConfig {
  /// Passed as `EXTRAVERSION` and used in the build directory name.
  pub version: String,
  /// Config file, relative to the source tree.
  pub config: String,
}

impl KConfig {
  fn objdir(&self) -> String {
    format!("build-{}", self.version)
  }

  /// `EXTRAVERSION=.. O=..` selecting this configuration's build directory.
  fn make_vars(&self) -> String {
    let extraversion = format!("EXTRAVERSION={}", self.version);
    let objdir = format!("O={}", self.objdir());
    format!("{} {}", shell_quote(&extraversion), shell_quote(&objdir))
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Linux {
  pub kconfigs: Vec<KConfig>,
  pub makeargs: String,
}

const PHASES: &[Phase<Linux>] = &[
  Phase {
    skip: Some(skip_checkout),
    recovery: &[FORCE_CHECKOUT],
    policy_checkpoint: true,
    ..Phase::new(CHECKOUT, checkout)
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
    skip: Some(skip_install),
    recovery: &[FORCE_CHECKOUT, CONFIGURE],
    ..Phase::new(INSTALL, install_kernel)
  },
  Phase {
    skip: Some(skip_install),
    ..Phase::new(MODULES_INSTALL, install_modules)
  },
  Phase {
    skip: Some(skip_install),
    ..Phase::new(HEADERS_INSTALL, install_headers)
  },
];

fn make_program() -> String {
  std::env::var("MAKE").ok().filter(|m| !m.is_empty()).unwrap_or_else(|| "make".to_string())
}

impl Linux {
  fn makeargs(&self, module: &Module, config: &Config) -> String {
    common::collect_args(&self.makeargs, &config.module_makeargs, &config.makeargs, &module.name, config)
  }

  /// Runs `make <args> <target> EXTRAVERSION=.. O=..` for every configuration.
  fn for_each_kconfig(
    &self,
    module: &Module,
    ctx: &mut BuildContext,
    args: &str,
    target: &str,
    extra: &str,
  ) -> PhaseResult {
    let srcdir = module.srcdir(ctx.config());
    let env = module.env(ctx.config());
    let make = make_program();
    for kconfig in &self.kconfigs {
      let cmd = Cmd::shell(common::command_line(&[
        make.as_str(),
        args,
        target,
        &kconfig.make_vars(),
        extra,
      ]));
      ctx.execute(&cmd, &srcdir, &env)?;
    }
    Ok(Flow::Next)
  }
}

/// Without network access the existing tree is used.
fn skip_checkout(_: &Linux, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  ctx.config().nonetwork
}

fn checkout(backend: &Linux, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  common::checkout(backend, module, ctx)?;
  let srcdir = module.srcdir(ctx.config());
  for kconfig in &backend.kconfigs {
    let path = srcdir.join(&kconfig.config);
    if !path.is_file() {
      return Err(PhaseError::state(format!("kconfig file {} was not created", path.display())));
    }
  }
  Ok(Flow::Next)
}

fn configure(backend: &Linux, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Configuring", &module.name);
  let srcdir = module.srcdir(ctx.config());
  let env = module.env(ctx.config());
  let dotconfig = srcdir.join(".config");
  let make = make_program();
  for kconfig in &backend.kconfigs {
    fs::copy(srcdir.join(&kconfig.config), &dotconfig)
      .map_err(|e| PhaseError::io(format!("failed to install {}", kconfig.config), e))?;
    common::ensure_dir(&srcdir.join(kconfig.objdir()))?;
    let cmd = Cmd::shell(common::command_line(&[make.as_str(), "oldconfig", &kconfig.make_vars()]));
    ctx.execute(&cmd, &srcdir, &env)?;
    fs::remove_file(&dotconfig).map_err(|e| PhaseError::io(format!("failed to remove {}", dotconfig.display()), e))?;
  }
  Ok(Flow::Next)
}

fn clean(backend: &Linux, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Cleaning", &module.name);
  let args = backend.makeargs(module, ctx.config());
  backend.for_each_kconfig(module, ctx, &args, "clean", "")
}

fn build(backend: &Linux, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  let args = backend.makeargs(module, ctx.config());
  let args = common::with_jobs(&args, module, ctx.config());
  backend.for_each_kconfig(module, ctx, &args, "", "")
}

fn skip_install(_: &Linux, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), false)
}

fn install_kernel(backend: &Linux, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  let args = backend.makeargs(module, ctx.config());
  let boot = ctx.config().prefix.join("boot");
  common::ensure_dir(&boot)?;
  backend.for_each_kconfig(module, ctx, &args, "install", &common::path_arg("INSTALL_PATH=", &boot))
}

fn install_modules(backend: &Linux, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing modules", &module.name);
  let args = backend.makeargs(module, ctx.config());
  let prefix = common::path_arg("INSTALL_MOD_PATH=", &ctx.config().prefix);
  backend.for_each_kconfig(module, ctx, &args, "modules_install", &prefix)
}

fn install_headers(backend: &Linux, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing headers", &module.name);
  install::install(module, ctx, |ctx, _| {
    let args = backend.makeargs(module, ctx.config());
    let prefix = common::path_arg("INSTALL_HDR_PATH=", &ctx.config().prefix);
    backend.for_each_kconfig(module, ctx, &args, "headers_install", &prefix)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Linux {
  fn type_name(&self) -> &'static str {
    "linux"
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
    module.srcdir(config)
  }

  fn write_descriptor(&self, element: &mut Element) {
    common::attr_unless(element, "makeargs", &self.makeargs, "");
    for kconfig in &self.kconfigs {
      element.children.push(
        Element::new("kconfig")
          .with_attr("version", kconfig.version.as_str())
          .with_attr("config", kconfig.config.as_str()),
      );
    }
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let name = element.attr("id").unwrap_or_default();
  let invalid = |message: String| ModuleSetError::InvalidModule {
    module: name.to_string(),
    message,
  };

  let kconfigs = element
    .children_named("kconfig")
    .map(|k| {
      let version = k.attr("version").ok_or_else(|| invalid("<kconfig> without version".into()))?;
      let config = k
        .attr("config")
        .ok_or_else(|| invalid(format!("<kconfig version=\"{}\"> without config", version)))?;
      Ok(KConfig {
        version: version.to_string(),
        config: config.to_string(),
      })
    })
    .collect::<Result<Vec<_>, ModuleSetError>>()?;
  if kconfigs.is_empty() {
    return Err(invalid("no <kconfig> elements found".into()));
  }

  let kind = Linux {
    kconfigs,
    makeargs: element.attr("makeargs").unwrap_or_default().to_string(),
  };
  ctx.module(element, Box::new(kind))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::exec::RecordingExecutor;
  use crate::build::runner::{NonInteractive, RunOutcome, run_module};
  use crate::descriptor::parse_str;
  use crate::module::branch::LocalBranchFactory;
  use crate::util::testutil::{context_with, parse_module, test_config};
  use serial_test::serial;
  use std::collections::BTreeMap;
  use tempfile::TempDir;

  const KERNEL: &str = r#"<linux id="kernel">
      <kconfig version="-desktop" config="configs/desktop"/>
      <kconfig version="-server" config="configs/server"/>
    </linux>"#;

  #[test]
  #[serial]
  fn every_configuration_builds_in_its_own_tree() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let srcdir = config.checkoutroot.join("kernel");
    fs::create_dir_all(srcdir.join("configs")).unwrap();
    fs::write(srcdir.join("configs/desktop"), "CONFIG_SMP=y\n").unwrap();
    fs::write(srcdir.join("configs/server"), "CONFIG_SMP=y\n").unwrap();
    let module = parse_module(KERNEL, &config);
    let prefix = config.prefix.display().to_string();
    let (executor, log) = RecordingExecutor::new();
    let copied = srcdir.join(".config");
    let executor = executor.on("oldconfig", move |_| {
      assert!(copied.is_file());
      Ok(())
    });
    let mut ctx = context_with(config, executor);

    let outcome = temp_env::with_var("MAKE", None::<&str>, || {
      run_module(&module, &[], &mut ctx, &mut NonInteractive)
    });

    assert!(matches!(outcome, RunOutcome::Built), "{:?}", outcome);
    let commands = log.commands();
    assert_eq!(
      commands[..4],
      [
        "make oldconfig EXTRAVERSION=-desktop O=build--desktop",
        "make oldconfig EXTRAVERSION=-server O=build--server",
        "make -j2 EXTRAVERSION=-desktop O=build--desktop",
        "make -j2 EXTRAVERSION=-server O=build--server",
      ]
    );
    assert!(commands.contains(&format!(
      "make install EXTRAVERSION=-server O=build--server INSTALL_PATH={}/boot",
      prefix
    )));
    assert!(commands.contains(&format!(
      "make modules_install EXTRAVERSION=-desktop O=build--desktop INSTALL_MOD_PATH={}",
      prefix
    )));
    assert!(srcdir.join("build--server").is_dir());
    assert!(!srcdir.join(".config").exists());
    assert!(ctx.packagedb.get("kernel").is_some());
  }

  #[test]
  fn missing_config_file_fails_checkout() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    fs::create_dir_all(config.checkoutroot.join("kernel")).unwrap();
    let module = parse_module(KERNEL, &config);
    let (executor, _) = RecordingExecutor::new();
    let mut ctx = context_with(config, executor);

    let outcome = run_module(&module, &[], &mut ctx, &mut NonInteractive);

    assert!(matches!(outcome, RunOutcome::Failed { phase: "checkout", .. }));
  }

  #[test]
  fn kconfig_is_required() {
    let config = test_config(std::path::Path::new("/state"));
    let element = parse_str(r#"<linux id="kernel"/>"#).unwrap();
    let repositories = BTreeMap::new();
    let ctx = ParseContext {
      config: &config,
      repositories: &repositories,
      default_repo: None,
      branch_factory: &LocalBranchFactory,
    };
    let err = parse(&element, &ctx).unwrap_err();
    assert!(err.to_string().contains("no <kconfig> elements"), "{}", err);
  }
}
