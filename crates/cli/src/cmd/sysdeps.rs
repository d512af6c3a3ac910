//! Implementation of the `modbuild sysdeps` command.
//!
//! Probes every system dependency of the selected modules the same way the
//! `systemmodule` backend does, without building anything.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use modbuild_lib::build::BuildContext;
use modbuild_lib::build::exec::ShellExecutor;
use modbuild_lib::module::systemdeps::{SystemDependency, is_satisfied};
use modbuild_lib::moduleset::SelectOptions;

use super::{GlobalArgs, load_config, load_moduleset, open_packagedb, select};
use crate::output::{print_error, print_success, print_warning};

/// Returns false when any dependency is missing.
pub fn cmd_sysdeps(global: &GlobalArgs, modules: &[String]) -> Result<bool> {
  let config = load_config(global)?;
  let moduleset = load_moduleset(global, &config)?;
  let selected = select(&moduleset, modules, &SelectOptions::default())?;

  let mut wanted: BTreeMap<String, (&SystemDependency, Vec<&str>)> = BTreeMap::new();
  for module in &selected {
    for dep in &module.system_dependencies {
      wanted
        .entry(dep.to_string())
        .or_insert_with(|| (dep, Vec::new()))
        .1
        .push(module.name.as_str());
    }
  }
  if wanted.is_empty() {
    print_success("No system dependencies required.");
    return Ok(true);
  }

  let packagedb = open_packagedb(&config)?;
  let executor = ShellExecutor::new().context("Failed to create command runner")?;
  let mut ctx = BuildContext::new(Arc::new(config), packagedb, Box::new(executor));

  let mut missing = 0;
  for (label, (dep, users)) in &wanted {
    if is_satisfied(dep, &mut ctx) {
      print_success(label);
    } else {
      missing += 1;
      print_error(&format!("{} (required by {})", label, users.join(", ")));
    }
  }

  if missing > 0 {
    print_warning(&format!("{} of {} system dependencies missing", missing, wanted.len()));
  }
  Ok(missing == 0)
}
