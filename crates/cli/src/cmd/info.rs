//! Implementation of the `modbuild info` command.
//!
//! Shows a module's type, source and build directories, its edges in the
//! module graph, its system dependencies and what the package database
//! records about it.

use anyhow::Result;

use super::{GlobalArgs, load_config, load_moduleset, open_packagedb};
use crate::output::{OutputFormat, format_timestamp, print_json, print_stat};

pub fn cmd_info(global: &GlobalArgs, name: &str, format: OutputFormat) -> Result<()> {
  let config = load_config(global)?;
  let moduleset = load_moduleset(global, &config)?;
  let packagedb = open_packagedb(&config)?;

  let module = moduleset
    .get(name)
    .ok_or_else(|| modbuild_lib::moduleset::ModuleSetError::UnknownModule(name.to_string()))?;
  let required_by = moduleset.reverse_dependencies(name)?;
  let entry = packagedb.get(name);
  let sysdeps: Vec<String> = module.system_dependencies.iter().map(ToString::to_string).collect();

  if format.is_json() {
    return print_json(&serde_json::json!({
      "name": module.name,
      "type": module.type_name(),
      "revision": module.revision(),
      "srcdir": module.srcdir(&config),
      "builddir": module.builddir(&config),
      "dependencies": module.dependencies,
      "after": module.after,
      "suggests": module.suggests,
      "required_by": required_by,
      "system_dependencies": sysdeps,
      "installed": entry,
    }));
  }

  println!("{}", module.name);
  print_stat("Type", module.type_name());
  if let Some(revision) = module.revision() {
    print_stat("Revision", &revision);
  }
  print_stat("Source", &module.srcdir(&config).display().to_string());
  print_stat("Build", &module.builddir(&config).display().to_string());
  match entry {
    Some(entry) => {
      let revision = if entry.revision.is_empty() { "-" } else { entry.revision.as_str() };
      print_stat("Installed", &format!("{} ({})", revision, format_timestamp(entry.installed_at)));
      if let Some(manifest) = &entry.manifest {
        print_stat("Files", &manifest.len().to_string());
      }
      if let Some(cmd) = &entry.configure_cmd {
        print_stat("Configured with", cmd);
      }
    }
    None => print_stat("Installed", "no"),
  }
  for (label, list) in [
    ("Requires", &module.dependencies),
    ("After", &module.after),
    ("Suggests", &module.suggests),
    ("Required by", &required_by),
    ("System dependencies", &sysdeps),
  ] {
    if !list.is_empty() {
      print_stat(label, &list.join(", "));
    }
  }
  Ok(())
}
