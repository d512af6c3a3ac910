//! Build-policy check: may an installed module be left alone?

use tracing::debug;

use crate::config::{BuildPolicy, Config};
use crate::module::Module;
use crate::packagedb::PackageDb;

/// True when `module` need not be rebuilt under the configured policy.
///
/// `dependencies` are the transitive hard dependencies of `module`.
pub fn is_up_to_date(module: &Module, dependencies: &[String], config: &Config, packagedb: &PackageDb) -> bool {
  if config.build_policy == BuildPolicy::All {
    return false;
  }
  if module.branch.as_ref().is_some_and(|b| b.is_dirty()) {
    debug!(module = %module.name, "local changes, rebuilding");
    return false;
  }

  let revision = module.revision().unwrap_or_default();
  if !packagedb.check(&module.name, &revision) {
    return false;
  }

  if let Some(current) = module.configure_command(config) {
    let recorded = packagedb.get(&module.name).and_then(|e| e.configure_cmd.as_deref());
    if recorded != Some(current.as_str()) {
      debug!(module = %module.name, "configure arguments changed, rebuilding");
      return false;
    }
  }

  if config.build_policy == BuildPolicy::UpdatedDeps {
    let Some(installed) = packagedb.install_date(&module.name) else {
      return false;
    };
    if let Some(newer) = dependencies
      .iter()
      .find(|dep| packagedb.install_date(dep).is_some_and(|date| date > installed))
    {
      debug!(module = %module.name, dependency = %newer, "dependency installed later, rebuilding");
      return false;
    }
  }

  true
}
