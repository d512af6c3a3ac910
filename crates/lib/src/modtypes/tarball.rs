//! Modules distributed as a source archive.
//!
//! The archive is downloaded into the checkout root, verified against the
//! declared size and checksum, unpacked, patched, and then built like an
//! autotools package. An archive that already matches is not downloaded
//! again, and an already unpacked tree goes straight to `configure`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::build::context::BuildContext;
use crate::build::exec::{Cmd, quote_path};
use crate::build::install;
use crate::config::Config;
use crate::descriptor::Element;
use crate::modtypes::common;
use crate::module::phase::{
  self, BUILD, CONFIGURE, DOWNLOAD, Flow, INSTALL, PATCH, Phase, PhaseError, PhaseResult, PhaseSpec, UNPACK,
};
use crate::module::registry::ParseContext;
use crate::module::systemdeps::find_program;
use crate::module::{Module, ModuleType};
use crate::moduleset::ModuleSetError;
use crate::util::hash::Checksum;

const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".tar", ".zip"];

/// A patch applied after unpacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
  /// Absolute, or relative to the checkout root.
  pub file: String,
  pub strip: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tarball {
  pub version: String,
  pub href: String,
  pub size: Option<u64>,
  pub hash: Option<Checksum>,
  pub patches: Vec<Patch>,
  /// Directory the archive unpacks to, when it differs from the archive name.
  pub checkoutdir: Option<String>,
  pub autogenargs: String,
  pub makeargs: String,
}

const PHASES: &[Phase<Tarball>] = &[
  Phase {
    skip: Some(skip_download),
    policy_checkpoint: true,
    ..Phase::new(DOWNLOAD, download)
  },
  Phase {
    recovery: &[DOWNLOAD],
    ..Phase::new(UNPACK, unpack)
  },
  Phase {
    skip: Some(skip_patch),
    recovery: &[UNPACK],
    ..Phase::new(PATCH, patch)
  },
  Phase {
    skip: Some(common::skip_nobuild),
    recovery: &[UNPACK],
    ..Phase::new(CONFIGURE, configure)
  },
  Phase {
    skip: Some(common::skip_nobuild),
    recovery: &[CONFIGURE],
    ..Phase::new(BUILD, build)
  },
  Phase {
    skip: Some(skip_install),
    recovery: &[CONFIGURE],
    ..Phase::new(INSTALL, install_phase)
  },
];

impl Tarball {
  /// File name of the archive, taken from the last path segment of `href`.
  pub fn archive_name(&self) -> &str {
    let path = self.href.split(['?', '#']).next().unwrap_or(&self.href);
    path.rsplit('/').next().unwrap_or(path)
  }

  pub fn archive_path(&self, config: &Config) -> PathBuf {
    config.checkoutroot.join(self.archive_name())
  }

  fn unpacked_name(&self) -> String {
    if let Some(dir) = &self.checkoutdir {
      return dir.clone();
    }
    let name = self.archive_name();
    ARCHIVE_SUFFIXES
      .iter()
      .find_map(|suffix| name.strip_suffix(suffix))
      .unwrap_or(name)
      .to_string()
  }

  /// Whether `path` has the declared size and checksum.
  fn verify(&self, path: &Path) -> Result<(), String> {
    let metadata = fs::metadata(path).map_err(|_| format!("{} was not downloaded", path.display()))?;
    if let Some(size) = self.size {
      if metadata.len() != size {
        return Err(format!(
          "{} has size {}, expected {}",
          path.display(),
          metadata.len(),
          size
        ));
      }
    }
    if let Some(hash) = &self.hash {
      match hash.matches_file(path) {
        Ok(true) => {}
        Ok(false) => return Err(format!("{} does not match {}", path.display(), hash)),
        Err(e) => return Err(e.to_string()),
      }
    }
    Ok(())
  }

  fn configure_cmd(&self, module: &Module, config: &Config) -> String {
    let mut parts = vec!["./configure --prefix".to_string(), quote_path(&config.prefix)];
    if config.use_lib64 {
      parts.push("--libdir '${exec_prefix}/lib64'".to_string());
    }
    let args = common::collect_args(
      &self.autogenargs,
      &config.module_autogenargs,
      &config.autogenargs,
      &module.name,
      config,
    );
    parts.extend(args.split(' ').filter(|t| *t != "--enable-maintainer-mode").map(str::to_string));
    common::command_line(&parts)
  }

  fn make(&self, module: &Module, config: &Config, target: &str) -> Cmd {
    let args = common::collect_args(&self.makeargs, &config.module_makeargs, &config.makeargs, &module.name, config);
    Cmd::shell(common::command_line(&["make", &common::with_jobs(&args, module, config), target]))
  }
}

fn skip_download(backend: &Tarball, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  let archive = backend.archive_path(ctx.config());
  archive.is_file() && backend.verify(&archive).is_ok()
}

fn download(backend: &Tarball, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  let config = ctx.config();
  let archive = backend.archive_path(config);
  if config.nonetwork {
    return Err(PhaseError::state(format!(
      "{} is missing or does not match and network access is disabled",
      archive.display()
    )));
  }

  let prefix = config.prefix.clone();
  let checkoutroot = config.checkoutroot.clone();
  ctx.set_action("Downloading", &module.name);
  common::ensure_dir(&checkoutroot)?;
  let target = archive.display().to_string();
  let cmd = if find_program("curl", &prefix).is_some() {
    Cmd::argv(["curl", "-L", "-f", "-o", target.as_str(), backend.href.as_str()])
  } else {
    Cmd::argv(["wget", "-O", target.as_str(), backend.href.as_str()])
  };
  ctx.execute(&cmd, &checkoutroot, &[])?;

  backend.verify(&archive).map_err(PhaseError::BuildState)?;
  Ok(Flow::Next)
}

fn unpack(backend: &Tarball, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  let config = ctx.config();
  let srcdir = module.srcdir(config);
  if srcdir.is_dir() {
    debug!(module = %module.name, path = %srcdir.display(), "already unpacked");
    return Ok(Flow::SkipToPhase(CONFIGURE));
  }

  let checkoutroot = config.checkoutroot.clone();
  let archive = backend.archive_path(config).display().to_string();
  ctx.set_action("Unpacking", &module.name);
  let cmd = if backend.archive_name().ends_with(".zip") {
    Cmd::argv(["unzip", "-q", archive.as_str()])
  } else {
    Cmd::argv(["tar", "xf", archive.as_str()])
  };
  ctx.execute(&cmd, &checkoutroot, &[])?;

  if !srcdir.is_dir() {
    return Err(PhaseError::state(format!(
      "could not unpack {}: {} was not created",
      archive,
      srcdir.display()
    )));
  }
  Ok(Flow::Next)
}

fn skip_patch(backend: &Tarball, _: &Module, _: &BuildContext, _: Option<&str>) -> bool {
  backend.patches.is_empty()
}

fn patch(backend: &Tarball, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  let config = ctx.config();
  let srcdir = module.srcdir(config);
  let checkoutroot = config.checkoutroot.clone();
  for p in &backend.patches {
    let file = checkoutroot.join(&p.file);
    if !file.is_file() {
      return Err(PhaseError::state(format!("patch file {} does not exist", file.display())));
    }
    ctx.set_action("Applying patch to", &module.name);
    let strip = format!("-p{}", p.strip);
    let file = file.display().to_string();
    ctx.execute(&Cmd::argv(["patch", strip.as_str(), "-i", file.as_str()]), &srcdir, &[])?;
  }
  Ok(Flow::Next)
}

fn configure(backend: &Tarball, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Configuring", &module.name);
  let config = ctx.config();
  let cmd = Cmd::shell(backend.configure_cmd(module, config));
  let srcdir = module.srcdir(config);
  let env = module.env(config);
  ctx.execute(&cmd, &srcdir, &env)?;
  Ok(Flow::Next)
}

fn build(backend: &Tarball, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Building", &module.name);
  let config = ctx.config();
  let cmd = backend.make(module, config, "");
  let srcdir = module.srcdir(config);
  let env = module.env(config);
  ctx.execute(&cmd, &srcdir, &env)?;
  Ok(Flow::Next)
}

fn skip_install(_: &Tarball, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  common::skip_install(ctx.config(), false)
}

fn install_phase(backend: &Tarball, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Installing", &module.name);
  install::install(module, ctx, |ctx, destdir| {
    let config = ctx.config();
    let destdir = destdir.map(|d| common::path_arg("DESTDIR=", d)).unwrap_or_default();
    let cmd = backend.make(module, config, &format!("install {}", destdir));
    let srcdir = module.srcdir(config);
    let env = module.env(config);
    ctx.execute(&cmd, &srcdir, &env)?;
    Ok(())
  })?;
  Ok(Flow::Next)
}

impl ModuleType for Tarball {
  fn type_name(&self) -> &'static str {
    "tarball"
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

  fn srcdir(&self, _module: &Module, config: &Config) -> PathBuf {
    config.checkoutroot.join(self.unpacked_name())
  }

  fn revision(&self, _module: &Module) -> Option<String> {
    Some(self.version.clone()).filter(|v| !v.is_empty())
  }

  fn configure_command(&self, module: &Module, config: &Config) -> Option<String> {
    Some(self.configure_cmd(module, config))
  }

  fn supports_install_destdir(&self) -> bool {
    true
  }

  fn needs_branch(&self) -> bool {
    false
  }

  fn write_descriptor(&self, element: &mut Element) {
    common::attr_unless(element, "version", &self.version, "");
    if let Some(dir) = &self.checkoutdir {
      element.set_attr("checkoutdir", dir.as_str());
    }
    common::attr_unless(element, "autogenargs", &self.autogenargs, "");
    common::attr_unless(element, "makeargs", &self.makeargs, "");

    let mut source = Element::new("source").with_attr("href", self.href.as_str());
    if let Some(size) = self.size {
      source.set_attr("size", size.to_string());
    }
    if let Some(hash) = &self.hash {
      source.set_attr("hash", hash.to_string());
    }
    element.children.push(source);

    if !self.patches.is_empty() {
      let mut list = Element::new("patches");
      for p in &self.patches {
        let mut patch = Element::new("patch").with_attr("file", p.file.as_str());
        if p.strip != 0 {
          patch.set_attr("strip", p.strip.to_string());
        }
        list.children.push(patch);
      }
      element.children.push(list);
    }
  }
}

pub fn parse(element: &Element, ctx: &ParseContext<'_>) -> Result<Module, ModuleSetError> {
  let name = element.attr("id").unwrap_or_default();
  let invalid = |message: String| ModuleSetError::InvalidModule {
    module: name.to_string(),
    message,
  };

  let source = element
    .child("source")
    .ok_or_else(|| invalid("tarball without <source>".into()))?;
  let href = source.required_attr("href")?.to_string();
  let size = source
    .attr("size")
    .map(|s| s.parse::<u64>().map_err(|_| invalid(format!("invalid source size '{}'", s))))
    .transpose()?;
  let hash = source
    .attr("hash")
    .map(|h| Checksum::parse(h).map_err(|e| invalid(e.to_string())))
    .transpose()?;
  if size.is_none() && hash.is_none() {
    warn!(module = %name, "tarball has neither size nor hash, download cannot be verified");
  }

  let patches = element
    .child("patches")
    .map(|list| {
      list
        .children_named("patch")
        .map(|p| {
          let file = p.required_attr("file")?.to_string();
          let strip = match p.attr("strip") {
            Some(s) => s.parse().map_err(|_| invalid(format!("invalid patch strip '{}'", s)))?,
            None => 0,
          };
          Ok(Patch { file, strip })
        })
        .collect::<Result<Vec<_>, ModuleSetError>>()
    })
    .transpose()?
    .unwrap_or_default();

  let kind = Tarball {
    version: element.attr("version").unwrap_or_default().to_string(),
    href,
    size,
    hash,
    patches,
    checkoutdir: element.attr("checkoutdir").map(str::to_string),
    autogenargs: element.attr("autogenargs").unwrap_or_default().to_string(),
    makeargs: element.attr("makeargs").unwrap_or_default().to_string(),
  };
  ctx.module(element, Box::new(kind))
}
