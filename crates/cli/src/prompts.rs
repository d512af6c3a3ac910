use anyhow::{Result, bail};
use std::io::{self, IsTerminal, Write};

use modbuild_lib::build::runner::PhaseFailure;
use modbuild_lib::build::{ErrorChoice, ErrorHandler};

pub fn is_interactive() -> bool {
  io::stdin().is_terminal() && io::stderr().is_terminal()
}

pub fn confirm(message: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }

  if !is_interactive() {
    bail!("Cannot prompt for confirmation in non-interactive mode. Use --force to proceed.");
  }

  write!(io::stderr(), "{} [y/N] ", message)?;
  io::stderr().flush()?;

  let mut input = String::new();
  io::stdin().read_line(&mut input)?;

  Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Asks on the terminal what to do about a failed phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct InteractiveHandler;

/// The error menu for `failure`: fixed choices first, then its recovery phases.
fn menu(failure: &PhaseFailure<'_>) -> Vec<(String, ErrorChoice)> {
  let mut options = vec![
    (format!("Rerun phase {}", failure.phase), ErrorChoice::Retry),
    ("Ignore error and continue to the next phase".to_string(), ErrorChoice::Continue),
    ("Give up on module".to_string(), ErrorChoice::Poison),
    ("Start shell".to_string(), ErrorChoice::Shell),
  ];
  options.extend(
    failure
      .recovery
      .iter()
      .map(|phase| (format!("Go to phase \"{}\"", phase), ErrorChoice::Jump(phase.to_string()))),
  );
  options
}

/// A 1-based menu selection.
fn parse_choice(input: &str, len: usize) -> Option<usize> {
  let n: usize = input.trim().parse().ok()?;
  (1..=len).contains(&n).then(|| n - 1)
}

impl ErrorHandler for InteractiveHandler {
  fn choose(&mut self, failure: &PhaseFailure<'_>) -> ErrorChoice {
    let mut options = menu(failure);
    let mut stderr = io::stderr();
    loop {
      let _ = writeln!(stderr, "\n{} failed during phase {}: {}", failure.module, failure.phase, failure.error);
      for (i, (label, _)) in options.iter().enumerate() {
        let _ = writeln!(stderr, "  [{}] {}", i + 1, label);
      }
      let _ = write!(stderr, "choice: ");
      let _ = stderr.flush();

      let mut input = String::new();
      match io::stdin().read_line(&mut input) {
        Ok(0) | Err(_) => return ErrorChoice::Poison,
        Ok(_) => {}
      }
      if let Some(index) = parse_choice(&input, options.len()) {
        return options.swap_remove(index).1;
      }
      let _ = writeln!(stderr, "invalid choice");
    }
  }

  fn confirm(&mut self, question: &str) -> bool {
    confirm(question, false).unwrap_or(false)
  }
}
