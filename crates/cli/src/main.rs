//! `modbuild`: builds a moduleset, in dependency order, into one prefix.

mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use modbuild_lib::config::BuildPolicy;

use crate::cmd::{BuildArgs, GlobalArgs};
use crate::output::OutputFormat;

/// Build interdependent source modules into a shared prefix
#[derive(Parser)]
#[command(name = "modbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Configuration file (default: $MODBUILD_CONFIG or ~/.config/modbuild/config.toml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Moduleset to load instead of the configured one
  #[arg(short, long, global = true)]
  moduleset: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build modules and everything they depend on
  Build {
    /// Modules to build (default: the configured modules, or all)
    modules: Vec<String>,

    /// Print the build order without building
    #[arg(long)]
    dry_run: bool,

    /// Offer a recovery menu when a phase fails
    #[arg(short, long)]
    interactive: bool,

    /// Which installed modules to rebuild: all, updated or updated-deps
    #[arg(long)]
    policy: Option<BuildPolicy>,

    /// Modules never to build
    #[arg(short, long, value_delimiter = ',')]
    skip: Vec<String>,

    /// Build only the named modules
    #[arg(long)]
    no_deps: bool,

    /// Do not touch the network
    #[arg(long)]
    nonetwork: bool,
  },

  /// List modules in build order with their installed revision
  List {
    /// Modules to list with their dependencies (default: all)
    modules: Vec<String>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show everything known about a module
  Info {
    module: String,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Remove installed modules and their files
  Uninstall {
    #[arg(required = true)]
    modules: Vec<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    force: bool,
  },

  /// Print the dependency graph in Graphviz format
  Dot {
    /// Modules to include with their dependencies (default: all)
    modules: Vec<String>,
  },

  /// Check the system dependencies of modules
  Sysdeps {
    /// Modules to check with their dependencies (default: all)
    modules: Vec<String>,
  },
}

fn init_logging(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("modbuild=debug,modbuild_lib=debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .with_writer(std::io::stderr)
    .init();
}

fn run(cli: Cli) -> Result<bool> {
  let global = GlobalArgs {
    config: cli.config,
    moduleset: cli.moduleset,
  };

  match cli.command {
    Commands::Build {
      modules,
      dry_run,
      interactive,
      policy,
      skip,
      no_deps,
      nonetwork,
    } => cmd::cmd_build(
      &global,
      BuildArgs {
        modules,
        dry_run,
        interactive,
        policy,
        skip,
        no_deps,
        nonetwork,
      },
    ),
    Commands::List { modules, format } => cmd::cmd_list(&global, &modules, format).map(|_| true),
    Commands::Info { module, format } => cmd::cmd_info(&global, &module, format).map(|_| true),
    Commands::Uninstall { modules, force } => cmd::cmd_uninstall(&global, &modules, force).map(|_| true),
    Commands::Dot { modules } => cmd::cmd_dot(&global, &modules).map(|_| true),
    Commands::Sysdeps { modules } => cmd::cmd_sysdeps(&global, &modules),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(cli) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      output::print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
