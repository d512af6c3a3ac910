//! Host-provided dependencies.
//!
//! A system dependency is verified, never built. Each one may list
//! alternatives; the dependency is satisfied when any of them is present.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::build::context::BuildContext;
use crate::build::exec::Cmd;
use crate::descriptor::Element;
use crate::moduleset::ModuleSetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysDepKind {
  /// An executable on `PATH`.
  Path,
  /// A C header.
  CInclude,
  /// A pkg-config package.
  PkgConfig,
  Python2,
  Python3,
  /// An entry in the XML catalog.
  Xml,
}

impl SysDepKind {
  pub fn as_str(self) -> &'static str {
    match self {
      SysDepKind::Path => "path",
      SysDepKind::CInclude => "c_include",
      SysDepKind::PkgConfig => "pkgconfig",
      SysDepKind::Python2 => "python2",
      SysDepKind::Python3 => "python3",
      SysDepKind::Xml => "xml",
    }
  }

  fn parse(value: &str) -> Option<Self> {
    Some(match value {
      "path" => SysDepKind::Path,
      "c_include" => SysDepKind::CInclude,
      "pkgconfig" => SysDepKind::PkgConfig,
      "python2" => SysDepKind::Python2,
      "python3" => SysDepKind::Python3,
      "xml" => SysDepKind::Xml,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemDependency {
  pub kind: SysDepKind,
  pub value: String,
  pub alternatives: Vec<SystemDependency>,
}

impl SystemDependency {
  pub fn new(kind: SysDepKind, value: impl Into<String>) -> Self {
    Self {
      kind,
      value: value.into(),
      alternatives: Vec::new(),
    }
  }

  /// Parses the children of a `<systemdependencies>` element.
  pub fn parse_list(module: &str, element: &Element) -> Result<Vec<Self>, ModuleSetError> {
    element
      .children_named("dep")
      .map(|dep| {
        let mut parsed = Self::parse_one(module, dep)?;
        parsed.alternatives = dep
          .children_named("altdep")
          .map(|alt| Self::parse_one(module, alt))
          .collect::<Result<_, _>>()?;
        Ok(parsed)
      })
      .collect()
  }

  fn parse_one(module: &str, element: &Element) -> Result<Self, ModuleSetError> {
    let invalid = |message: String| ModuleSetError::InvalidModule {
      module: module.to_string(),
      message,
    };
    let kind_attr = element.attr("type").ok_or_else(|| invalid("system dependency without type".into()))?;
    let kind = SysDepKind::parse(kind_attr)
      .ok_or_else(|| invalid(format!("unknown system dependency type '{}'", kind_attr)))?;
    let value = element
      .attr("name")
      .ok_or_else(|| invalid(format!("{} system dependency without name", kind_attr)))?;
    Ok(Self::new(kind, value))
  }

  pub fn to_element(&self, tag: &str) -> Element {
    let mut element = Element::new(tag)
      .with_attr("type", self.kind.as_str())
      .with_attr("name", self.value.as_str());
    for alt in &self.alternatives {
      element.children.push(alt.to_element("altdep"));
    }
    element
  }

  /// Candidates in the order they are probed.
  pub fn candidates(&self) -> impl Iterator<Item = &SystemDependency> {
    std::iter::once(self).chain(self.alternatives.iter())
  }
}

impl std::fmt::Display for SystemDependency {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.kind.as_str(), self.value)?;
    for alt in &self.alternatives {
      write!(f, " | {}:{}", alt.kind.as_str(), alt.value)?;
    }
    Ok(())
  }
}

/// True when `dep` or one of its alternatives is present on the host.
pub fn is_satisfied(dep: &SystemDependency, ctx: &mut BuildContext) -> bool {
  dep.candidates().any(|candidate| {
    let found = probe_one(candidate, ctx);
    debug!(dependency = %format!("{}:{}", candidate.kind.as_str(), candidate.value), found, "probed system dependency");
    found
  })
}

fn probe_one(dep: &SystemDependency, ctx: &mut BuildContext) -> bool {
  let prefix = ctx.config().prefix.clone();
  let cwd = std::env::temp_dir();
  match dep.kind {
    SysDepKind::Path => find_program(&dep.value, &prefix).is_some(),
    SysDepKind::CInclude => include_dirs(&prefix).iter().any(|dir| dir.join(&dep.value).is_file()),
    SysDepKind::PkgConfig => {
      let name = dep.value.strip_suffix(".pc").unwrap_or(&dep.value);
      ctx.probe(
        &Cmd::Argv(vec!["pkg-config".into(), "--exists".into(), name.to_string()]),
        &cwd,
      )
    }
    SysDepKind::Python2 | SysDepKind::Python3 => {
      let python = if dep.kind == SysDepKind::Python2 { "python2" } else { "python3" };
      ctx.probe(
        &Cmd::Argv(vec![python.into(), "-c".into(), format!("import {}", dep.value)]),
        &cwd,
      )
    }
    SysDepKind::Xml => ctx.probe(
      &Cmd::Argv(vec![
        "xmlcatalog".into(),
        "--noout".into(),
        "/etc/xml/catalog".into(),
        dep.value.clone(),
      ]),
      &cwd,
    ),
  }
}

/// Looks `name` up in `<prefix>/bin` and then `PATH`.
pub fn find_program(name: &str, prefix: &Path) -> Option<PathBuf> {
  let mut dirs = vec![prefix.join("bin")];
  if let Some(path) = std::env::var_os("PATH") {
    dirs.extend(std::env::split_paths(&path));
  }
  let joined: OsString = std::env::join_paths(dirs).ok()?;
  let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
  which::which_in(name, Some(joined), cwd).ok()
}

fn include_dirs(prefix: &Path) -> Vec<PathBuf> {
  let mut dirs = vec![prefix.join("include")];
  for var in ["CPATH", "C_INCLUDE_PATH"] {
    if let Some(value) = std::env::var_os(var) {
      dirs.extend(std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()));
    }
  }
  dirs.push(PathBuf::from("/usr/local/include"));
  dirs.push(PathBuf::from("/usr/include"));
  dirs
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::descriptor::parse_str;
  use crate::util::testutil::test_context;
  use tempfile::TempDir;

  #[test]
  fn parses_deps_with_alternatives() {
    let element = parse_str(
      r#"<systemdependencies>
           <dep type="pkgconfig" name="glib-2.0.pc">
             <altdep type="c_include" name="glib.h"/>
           </dep>
           <dep type="path" name="bison"/>
         </systemdependencies>"#,
    )
    .unwrap();

    let deps = SystemDependency::parse_list("m", &element).unwrap();
    assert_eq!(deps.len(), 2);
    assert_eq!(deps[0].kind, SysDepKind::PkgConfig);
    assert_eq!(deps[0].alternatives, vec![SystemDependency::new(SysDepKind::CInclude, "glib.h")]);
    assert_eq!(deps[0].to_string(), "pkgconfig:glib-2.0.pc | c_include:glib.h");
    assert_eq!(deps[1].to_element("dep"), element.children[1]);
  }

  #[test]
  fn unknown_type_is_invalid() {
    let element = parse_str(r#"<systemdependencies><dep type="rpm" name="x"/></systemdependencies>"#).unwrap();
    assert!(matches!(
      SystemDependency::parse_list("m", &element),
      Err(ModuleSetError::InvalidModule { .. })
    ));
  }

  #[test]
  fn header_in_prefix_satisfies_c_include() {
    let temp = TempDir::new().unwrap();
    let (mut ctx, _log) = test_context(temp.path());
    let include = ctx.config().prefix.join("include");
    std::fs::create_dir_all(&include).unwrap();
    std::fs::write(include.join("modbuild-test-only.h"), "").unwrap();

    let dep = SystemDependency::new(SysDepKind::CInclude, "modbuild-test-only.h");
    assert!(is_satisfied(&dep, &mut ctx));
  }

  #[test]
  fn alternative_satisfies_missing_primary() {
    let temp = TempDir::new().unwrap();
    let (mut ctx, log) = test_context(temp.path());
    let mut dep = SystemDependency::new(SysDepKind::Path, "definitely-not-a-real-tool-xyz");
    dep.alternatives.push(SystemDependency::new(SysDepKind::PkgConfig, "zlib.pc"));

    // The recording executor reports every probe as successful.
    assert!(is_satisfied(&dep, &mut ctx));
    assert_eq!(log.commands(), vec!["pkg-config --exists zlib"]);
  }

  #[cfg(unix)]
  #[test]
  fn program_in_prefix_bin_is_found() {
    use std::os::unix::fs::PermissionsExt;
    let temp = TempDir::new().unwrap();
    let bin = temp.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let tool = bin.join("mb-probe-tool");
    std::fs::write(&tool, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(find_program("mb-probe-tool", temp.path()), Some(tool));
  }
}
