//! Dependency-graph algorithms over a moduleset.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::warn;

use super::ModuleSetError;
use crate::module::Module;

/// Fails with the lexicographically first cycle among hard dependencies.
pub(super) fn check_cycles(modules: &BTreeMap<String, Module>) -> Result<(), ModuleSetError> {
  let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
  for module in modules.values() {
    graph.add_node(&module.name);
    for dep in &module.dependencies {
      graph.add_edge(&module.name, dep, ());
    }
  }

  let cyclic = tarjan_scc(&graph)
    .into_iter()
    .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
    .filter_map(|scc| {
      let members: BTreeSet<&str> = scc.into_iter().collect();
      members.first().copied().map(|start| (start, members))
    })
    .min_by_key(|(start, _)| *start);

  let Some((start, members)) = cyclic else {
    return Ok(());
  };

  // Walk from the smallest member, always taking the smallest in-cycle edge.
  let mut path: Vec<&str> = vec![start];
  loop {
    let current = path[path.len() - 1];
    let next = modules[current]
      .dependencies
      .iter()
      .map(String::as_str)
      .filter(|d| members.contains(d))
      .min()
      .unwrap_or(start);
    if let Some(pos) = path.iter().position(|p| *p == next) {
      let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
      cycle.push(next.to_string());
      return Err(ModuleSetError::Cycle { path: cycle });
    }
    path.push(next);
  }
}

/// Orders `selected` so that every dependency, suggestion and `after` entry
/// inside the selection precedes its dependent. Ties break by name.
///
/// Hard dependencies are acyclic once loaded; a cycle through soft edges is
/// broken at the smallest module whose hard dependencies are satisfied.
pub(super) fn topological_order<'a>(
  modules: &'a BTreeMap<String, Module>,
  selected: &BTreeSet<&'a str>,
) -> Vec<&'a str> {
  let prerequisites: BTreeMap<&str, (BTreeSet<&str>, BTreeSet<&str>)> = selected
    .iter()
    .filter_map(|name| modules.get_key_value(*name))
    .map(|(name, module)| {
      let in_selection = |list: &'a Vec<String>| {
        list
          .iter()
          .map(String::as_str)
          .filter(|d| selected.contains(d) && *d != name.as_str())
          .collect::<BTreeSet<&str>>()
      };
      let hard = in_selection(&module.dependencies);
      let mut all = hard.clone();
      all.extend(in_selection(&module.suggests));
      all.extend(in_selection(&module.after));
      (name.as_str(), (hard, all))
    })
    .collect();

  let mut emitted: BTreeSet<&str> = BTreeSet::new();
  let mut order: Vec<&str> = Vec::with_capacity(prerequisites.len());

  while order.len() < prerequisites.len() {
    let done = &emitted;
    let pending = || prerequisites.iter().filter(move |(name, _)| !done.contains(*name));
    let next = pending()
      .find(|(_, (_, all))| all.is_subset(done))
      .or_else(|| {
        let stuck = pending().find(|(_, (hard, _))| hard.is_subset(done));
        if let Some((name, _)) = stuck {
          warn!(module = %name, "breaking a soft dependency cycle");
        }
        stuck
      })
      .or_else(|| pending().next())
      .map(|(name, _)| *name);

    match next {
      Some(name) => {
        emitted.insert(name);
        order.push(name);
      }
      None => break,
    }
  }
  order
}

fn node_color(module: &Module) -> &'static str {
  match module.type_name() {
    "metamodule" => "lightcoral",
    "tarball" => "lightgoldenrod",
    "systemmodule" => "lightgrey",
    _ => "lightskyblue",
  }
}

pub(super) fn write_dot<W: io::Write>(modules: &[&Module], out: &mut W) -> io::Result<()> {
  let names: BTreeSet<&str> = modules.iter().map(|m| m.name.as_str()).collect();

  writeln!(out, "digraph \"G\" {{")?;
  writeln!(out, "  fontsize = 8;")?;
  writeln!(out, "  ratio = auto;")?;
  for module in modules {
    let label = match module.revision() {
      Some(rev) => format!("{}\\n{}", module.name, rev),
      None => module.name.clone(),
    };
    writeln!(
      out,
      "  \"{}\" [color=\"{}\",style=\"filled\",label=\"{}\"];",
      module.name,
      node_color(module),
      label
    )?;
  }
  for module in modules {
    for dep in module.dependencies.iter().filter(|d| names.contains(d.as_str())) {
      writeln!(out, "  \"{}\" -> \"{}\";", module.name, dep)?;
    }
    for dep in module.suggests.iter().filter(|d| names.contains(d.as_str())) {
      writeln!(out, "  \"{}\" -> \"{}\" [style=dotted];", module.name, dep)?;
    }
  }
  writeln!(out, "}}")
}
