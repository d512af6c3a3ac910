//! Implementation of the `modbuild build` command.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info};

use modbuild_lib::build::exec::{Executor, ShellExecutor};
use modbuild_lib::build::{BuildContext, ErrorHandler, NonInteractive, build};
use modbuild_lib::config::BuildPolicy;
use modbuild_lib::moduleset::SelectOptions;

use super::{GlobalArgs, load_config, load_moduleset, open_packagedb, select};
use crate::output::{ProgressObserver, print_info, print_summary};
use crate::prompts::{InteractiveHandler, is_interactive};

#[derive(Debug, Default)]
pub struct BuildArgs {
  pub modules: Vec<String>,
  pub dry_run: bool,
  pub interactive: bool,
  pub policy: Option<BuildPolicy>,
  pub skip: Vec<String>,
  pub no_deps: bool,
  pub nonetwork: bool,
}

/// Execute the build command.
///
/// Command-line options override the configuration file. Returns whether
/// every selected module was built or found up to date.
pub fn cmd_build(global: &GlobalArgs, args: BuildArgs) -> Result<bool> {
  let mut config = load_config(global)?;
  if let Some(policy) = args.policy {
    config.build_policy = policy;
  }
  config.nonetwork |= args.nonetwork;
  config.skip.extend(args.skip);
  let moduleset = load_moduleset(global, &config)?;

  let seeds = if args.modules.is_empty() {
    config.modules.clone()
  } else {
    args.modules
  };
  let options = SelectOptions {
    include_dependencies: !args.no_deps,
    include_suggests: !args.no_deps,
    skip: config.skip.clone(),
  };
  let modules = select(&moduleset, &seeds, &options)?;

  if args.dry_run {
    for (index, module) in modules.iter().enumerate() {
      println!("{:>3}. {} ({})", index + 1, module.name, module.type_name());
    }
    return Ok(true);
  }
  if modules.is_empty() {
    print_info("Nothing to build.");
    return Ok(true);
  }

  let interactive = (args.interactive || config.interact) && is_interactive();
  let packagedb = open_packagedb(&config)?;
  let executor = ShellExecutor::new().context("Failed to create command runner")?;
  watch_pause_signal(&executor)?;
  let mut ctx = BuildContext::new(Arc::new(config), packagedb, Box::new(executor))
    .with_observer(Box::new(ProgressObserver::default()));
  let mut handler: Box<dyn ErrorHandler> = if interactive {
    Box::new(InteractiveHandler)
  } else {
    Box::new(NonInteractive)
  };

  let started = Instant::now();
  let summary = build(&moduleset, &modules, &mut ctx, handler.as_mut()).context("Build failed")?;
  info!(elapsed = ?started.elapsed(), "build finished");

  print_summary(&summary, started.elapsed());
  Ok(summary.is_success())
}

/// SIGUSR1 pauses the running build and a second SIGUSR1 resumes it.
#[cfg(unix)]
fn watch_pause_signal(executor: &ShellExecutor) -> Result<()> {
  if let Some(pause) = executor.pause_handle() {
    pause.toggle_on_sigusr1().context("Failed to install pause signal handler")?;
    debug!(pid = std::process::id(), "send SIGUSR1 to pause or resume the build");
  }
  Ok(())
}

#[cfg(not(unix))]
fn watch_pause_signal(_: &ShellExecutor) -> Result<()> {
  Ok(())
}
