//! Implementation of the `modbuild dot` command.

use std::io::{self, Write};

use anyhow::Result;

use super::{GlobalArgs, load_config, load_moduleset};

pub fn cmd_dot(global: &GlobalArgs, modules: &[String]) -> Result<()> {
  let config = load_config(global)?;
  let moduleset = load_moduleset(global, &config)?;

  let mut out = io::stdout().lock();
  moduleset.write_dot(modules, &mut out)?;
  out.flush()?;
  Ok(())
}
