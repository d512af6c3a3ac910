//! Implementation of the `modbuild list` command.

use anyhow::Result;

use modbuild_lib::moduleset::SelectOptions;

use super::{GlobalArgs, load_config, load_moduleset, open_packagedb, select};
use crate::output::{OutputFormat, print_json};

pub fn cmd_list(global: &GlobalArgs, modules: &[String], format: OutputFormat) -> Result<()> {
  let config = load_config(global)?;
  let moduleset = load_moduleset(global, &config)?;
  let packagedb = open_packagedb(&config)?;
  let options = SelectOptions {
    skip: config.skip.clone(),
    ..Default::default()
  };
  let selected = select(&moduleset, modules, &options)?;

  if format.is_json() {
    let items: Vec<_> = selected
      .iter()
      .map(|m| {
        let installed = packagedb.get(&m.name);
        serde_json::json!({
          "name": m.name,
          "type": m.type_name(),
          "revision": m.revision(),
          "installed_revision": installed.map(|e| e.revision.clone()),
        })
      })
      .collect();
    return print_json(&items);
  }

  for module in selected {
    let installed = match packagedb.get(&module.name) {
      Some(entry) if entry.revision.is_empty() => "installed".to_string(),
      Some(entry) => format!("installed {}", entry.revision),
      None => "not installed".to_string(),
    };
    match module.revision() {
      Some(revision) => println!("{} {} ({})", module.name, revision, installed),
      None => println!("{} ({})", module.name, installed),
    }
  }
  Ok(())
}
