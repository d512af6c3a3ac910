//! Modules that only group dependencies.

use crate::build::context::BuildContext;
use crate::descriptor::Element;
use crate::module::phase::{self, DONE, Flow, Phase, PhaseResult, PhaseSpec};
use crate::module::registry::ParseContext;
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;

#[derive(Debug, Clone, Copy, Default)]
pub struct MetaModule;

const PHASES: &[Phase<MetaModule>] = &[Phase::new(DONE, done)];

fn done(_: &MetaModule, _: &Module, _: &mut BuildContext) -> PhaseResult {
  Ok(Flow::Next)
}

impl ModuleType for MetaModule {
  fn type_name(&self) -> &'static str {
    "metamodule"
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
  ctx.module(element, Box::new(MetaModule))
}
