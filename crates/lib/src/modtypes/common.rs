//! Pieces shared by the built-in backends: checkout phases, optional-phase
//! predicates, argument composition and build directory layout.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::build::context::BuildContext;
use crate::build::exec::{Cmd, quote_path, shell_quote};
use crate::config::Config;
use crate::descriptor::Element;
use crate::module::Module;
use crate::module::phase::{
  BUILD, CHECK, CLEAN, CONFIGURE, DIST, FORCE_CHECKOUT, Flow, INSTALL, PhaseError, PhaseResult,
};

pub(crate) fn checkout<T>(_: &T, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Checking out", &module.name);
  let branch = module
    .branch
    .as_deref()
    .ok_or_else(|| PhaseError::state(format!("{} has no branch to check out", module.name)))?;
  branch.checkout(ctx)?;
  let srcdir = module.srcdir(ctx.config());
  if !srcdir.is_dir() {
    return Err(PhaseError::state(format!(
      "checkout succeeded but {} does not exist",
      srcdir.display()
    )));
  }
  Ok(Flow::Next)
}

pub(crate) fn force_checkout<T>(_: &T, module: &Module, ctx: &mut BuildContext) -> PhaseResult {
  ctx.set_action("Checking out", &module.name);
  let branch = module
    .branch
    .as_deref()
    .ok_or_else(|| PhaseError::state(format!("{} has no branch to check out", module.name)))?;
  branch.force_checkout(ctx)?;
  Ok(Flow::Next)
}

/// Without network access an existing tree is used as is; a missing one
/// still reaches the checkout phase so the branch can report the problem.
pub(crate) fn skip_checkout<T>(_: &T, module: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  let Some(branch) = module.branch.as_deref() else {
    return true;
  };
  !branch.may_checkout(ctx.config()) && module.srcdir(ctx.config()).is_dir()
}

/// True when the runner arrives from a later phase through the error menu,
/// or right after a fresh checkout; configure must not be skipped then.
pub(crate) fn reentering(last: Option<&str>) -> bool {
  matches!(last, Some(FORCE_CHECKOUT | CLEAN | CONFIGURE | BUILD | CHECK | DIST | INSTALL))
}

pub(crate) fn skip_nobuild<T>(_: &T, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  ctx.config().nobuild
}

pub(crate) fn skip_clean<T>(_: &T, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  !ctx.config().makeclean || ctx.config().nobuild
}

pub(crate) fn skip_check<T>(_: &T, module: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  let config = ctx.config();
  if config.nobuild {
    return true;
  }
  match config.module_makecheck.get(&module.name) {
    Some(enabled) => !enabled,
    None => !config.wants_target(CHECK),
  }
}

pub(crate) fn skip_dist<T>(_: &T, _: &Module, ctx: &BuildContext, _: Option<&str>) -> bool {
  ctx.config().nobuild || !ctx.config().wants_target(DIST)
}

pub(crate) fn skip_install(config: &Config, skip_install_attr: bool) -> bool {
  config.nobuild || config.noinstall || skip_install_attr
}

/// Runs a test-suite command; failures are only logged under
/// `makecheck_advisory`.
pub(crate) fn run_check(module: &Module, ctx: &mut BuildContext, cmd: &Cmd, cwd: &Path) -> PhaseResult {
  ctx.set_action("Checking", &module.name);
  let env = module.env(ctx.config());
  match ctx.execute(cmd, cwd, &env) {
    Ok(()) => Ok(Flow::Next),
    Err(e) if ctx.config().makecheck_advisory => {
      warn!(module = %module.name, error = %e, "test suite failed, continuing");
      Ok(Flow::Next)
    }
    Err(e) => Err(e.into()),
  }
}

/// Substitutes `${prefix}` and `${libsuffix}` in descriptor arguments. The
/// prefix is quoted for the shell.
pub(crate) fn eval_args(args: &str, config: &Config) -> String {
  let libsuffix = if config.use_lib64 { "64" } else { "" };
  args
    .replace("${prefix}", &quote_path(&config.prefix))
    .replace("${libsuffix}", libsuffix)
}

/// Descriptor arguments followed by the per-module override, or the global
/// default when there is none, with whitespace normalised.
pub(crate) fn collect_args(
  own: &str,
  overrides: &BTreeMap<String, String>,
  global: &str,
  name: &str,
  config: &Config,
) -> String {
  let extra = overrides.get(name).map(String::as_str).unwrap_or(global);
  let joined = format!("{} {}", own, extra);
  eval_args(&joined.split_whitespace().collect::<Vec<_>>().join(" "), config)
}

/// Joins the non-empty parts of a command line with single spaces. Parts are
/// kept whole, so quoted paths survive.
pub(crate) fn command_line<S: AsRef<str>>(parts: &[S]) -> String {
  parts
    .iter()
    .map(|p| p.as_ref().trim())
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// `<flag><path>` as one shell word, e.g. `DESTDIR=/x` or `--destdir=/x`.
pub(crate) fn path_arg(flag: &str, path: &Path) -> String {
  shell_quote(&format!("{}{}", flag, path.display())).into_owned()
}

/// Applies the module's parallelism to make-style arguments.
///
/// Modules that cannot build in parallel get every job flag replaced with
/// `-j 1`; others get `-j<jobs>` unless a job flag is already present.
pub(crate) fn with_jobs(args: &str, module: &Module, config: &Config) -> String {
  // Arguments are already single-space separated; quoted words stay intact.
  let tokens: Vec<&str> = args.split(' ').filter(|t| !t.is_empty()).collect();
  let is_job_flag = |t: &str| t == "-j" || t == "--jobs" || t.starts_with("--jobs=") || job_value(t).is_some();

  if module.supports_parallel_build {
    if tokens.iter().any(|t| is_job_flag(t)) {
      return tokens.join(" ");
    }
    let jobs = format!("-j{}", config.jobs.max(1));
    let mut out = tokens;
    out.push(&jobs);
    return out.join(" ");
  }

  let mut out: Vec<&str> = Vec::with_capacity(tokens.len() + 2);
  let mut iter = tokens.into_iter().peekable();
  while let Some(token) = iter.next() {
    if token == "-j" || token == "--jobs" {
      if iter.peek().is_some_and(|n| n.chars().all(|c| c.is_ascii_digit())) {
        iter.next();
      }
      continue;
    }
    if token.starts_with("--jobs=") || job_value(token).is_some() {
      continue;
    }
    out.push(token);
  }
  out.push("-j");
  out.push("1");
  out.join(" ")
}

/// The number in a `-jN` token.
fn job_value(token: &str) -> Option<u32> {
  token.strip_prefix("-j").filter(|n| !n.is_empty()).and_then(|n| n.parse().ok())
}

/// Build directory of a module.
///
/// With a `buildroot` and a backend that supports it, the directory is
/// `buildroot/<builddir_pattern>`. `force_separate` keeps build output out of
/// the source tree even without a buildroot, in `<srcdir>/build`.
pub(crate) fn builddir(
  module: &Module,
  srcdir: PathBuf,
  config: &Config,
  non_srcdir: bool,
  force_separate: bool,
) -> PathBuf {
  let mut dir = srcdir.clone();
  if non_srcdir {
    if let Some(root) = &config.buildroot {
      let name = module
        .branch
        .as_deref()
        .map(|b| b.checkout_name())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| module.name.clone());
      dir = root.join(config.builddir_pattern.replace("%s", &name));
    }
  }
  if force_separate && dir == srcdir {
    dir = dir.join("build");
  }
  dir
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), PhaseError> {
  fs::create_dir_all(dir).map_err(|e| PhaseError::io(format!("failed to create {}", dir.display()), e))
}

/// The single wheel a build left in `dir`.
pub(crate) fn find_wheel(dir: &Path) -> Result<PathBuf, PhaseError> {
  let entries = fs::read_dir(dir).map_err(|e| PhaseError::io(format!("failed to read {}", dir.display()), e))?;
  let mut wheels: Vec<PathBuf> = entries
    .filter_map(Result::ok)
    .map(|e| e.path())
    .filter(|p| p.extension().is_some_and(|ext| ext == "whl"))
    .collect();
  match wheels.len() {
    1 => Ok(wheels.remove(0)),
    0 => Err(PhaseError::state(format!("no wheel was built in {}", dir.display()))),
    n => Err(PhaseError::state(format!("expected one wheel in {}, found {}", dir.display(), n))),
  }
}

/// Sets `key` on `element` unless `value` equals `default`.
pub(crate) fn attr_unless(element: &mut Element, key: &str, value: &str, default: &str) {
  if value != default {
    element.set_attr(key, value);
  }
}

pub(crate) fn bool_attr_unless(element: &mut Element, key: &str, value: bool, default: bool) {
  if value != default {
    element.set_attr(key, crate::descriptor::format_bool(value));
  }
}
