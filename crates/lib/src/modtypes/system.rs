//! Modules provided by the host system.
//!
//! A system module is never built. Its single phase verifies that every
//! declared system dependency is present, falling back to its `pkg-config`
//! file when it declares none.

use crate::build::context::BuildContext;
use crate::descriptor::Element;
use crate::module::phase::{self, Flow, Phase, PhaseError, PhaseResult, PhaseSpec, SYSDEPS};
use crate::module::registry::ParseContext;
use crate::module::systemdeps::{self, SysDepKind, SystemDependency};
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemModule;

const PHASES: &[Phase<SystemModule>] = &[Phase::new(SYSDEPS, check_sysdeps)];

fn check_sysdeps(_: &SystemModule, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Checking system dependencies of", &module.name);
  let fallback;
  let deps: &[SystemDependency] = match (&module.pkg_config, module.system_dependencies.is_empty()) {
    (Some(pc), true) => {
      fallback = [SystemDependency::new(SysDepKind::PkgConfig, pc.as_str())];
      &fallback
    }
    _ => &module.system_dependencies,
  };

  let missing: Vec<String> = deps
    .iter()
    .filter(|dep| !systemdeps::is_satisfied(dep, ctx))
    .map(ToString::to_string)
    .collect();
  if !missing.is_empty() {
    return Err(PhaseError::state(format!(
      "required system dependencies of {} are missing: {}",
      module.name,
      missing.join(", ")
    )));
  }
  Ok(Flow::Next)
}

impl ModuleType for SystemModule {
  fn type_name(&self) -> &'static str {
    "systemmodule"
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

  fn needs_branch(&self) -> bool {
    false
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  ctx.module(element, Box::new(SystemModule))
}
