//! Implementation of the `modbuild uninstall` command.

use anyhow::{Context, Result, bail};

use super::{GlobalArgs, load_config, open_packagedb};
use crate::output::{print_info, print_success};
use crate::prompts::confirm;

/// Removes each module's files from the prefix and forgets it. Modules are
/// handled in the order given; the first failure stops the command.
pub fn cmd_uninstall(global: &GlobalArgs, modules: &[String], force: bool) -> Result<()> {
  let config = load_config(global)?;
  let mut packagedb = open_packagedb(&config)?;

  let unknown: Vec<&str> = modules
    .iter()
    .filter(|m| packagedb.get(m.as_str()).is_none())
    .map(String::as_str)
    .collect();
  if !unknown.is_empty() {
    bail!("Not installed: {}", unknown.join(", "));
  }

  let question = format!("Remove {} from {}?", modules.join(", "), config.prefix.display());
  if !confirm(&question, force)? {
    print_info("Nothing removed.");
    return Ok(());
  }

  for module in modules {
    packagedb
      .uninstall(module)
      .with_context(|| format!("Failed to uninstall {}", module))?;
    print_success(&format!("Uninstalled {}", module));
  }
  Ok(())
}
