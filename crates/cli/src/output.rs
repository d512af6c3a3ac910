//! CLI output formatting utilities.
//!
//! Colored status lines, build progress, and human-readable durations and
//! timestamps.

use std::time::{Duration, UNIX_EPOCH};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use modbuild_lib::build::{BuildObserver, BuildSummary, RunOutcome};
use modbuild_lib::module::phase::PhaseError;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// Seconds since the Unix epoch as an RFC 3339 UTC time.
pub fn format_timestamp(secs: u64) -> String {
  humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Prints build progress as phases run.
#[derive(Debug, Default)]
pub struct ProgressObserver {
  index: usize,
  total: usize,
}

impl ProgressObserver {
  fn counter(&self) -> String {
    format!("[{}/{}]", self.index, self.total)
  }
}

impl BuildObserver for ProgressObserver {
  fn set_action(&mut self, label: &str, module: &str) {
    let counter = self.counter();
    eprintln!(
      "{} {} {} {}",
      symbols::ARROW.if_supports_color(Stream::Stderr, |s| s.cyan()),
      label,
      module.if_supports_color(Stream::Stderr, |s| s.bold()),
      counter.if_supports_color(Stream::Stderr, |s| s.dimmed())
    );
  }

  fn message(&mut self, text: &str) {
    print_info(text);
  }

  fn start_module(&mut self, _module: &str, index: usize, total: usize) {
    self.index = index + 1;
    self.total = total;
  }

  fn end_module(&mut self, module: &str, outcome: &RunOutcome) {
    if let RunOutcome::Failed { phase, error } = outcome {
      print_error(&format!("{} failed during phase {}: {}", module, phase, error));
    }
  }

  fn end_phase(&mut self, module: &str, phase: &str, error: Option<&PhaseError>) {
    if let Some(error) = error {
      print_warning(&format!("{}: phase {} failed: {}", module, phase, error));
    }
  }
}

pub fn print_summary(summary: &BuildSummary, elapsed: Duration) {
  println!();
  if summary.is_success() {
    print_success(&format!(
      "{} module(s) built, {} up to date in {}",
      summary.built.len(),
      summary.skipped.len(),
      format_duration(elapsed)
    ));
    print_skipped(summary);
    return;
  }

  print_error(&format!(
    "{} of {} module(s) could not be built",
    summary.failed.len() + summary.poisoned.len(),
    summary.total()
  ));
  for failed in &summary.failed {
    print_stat(&failed.module, &format!("failed during phase {}", failed.phase));
  }
  for (module, dependency) in &summary.poisoned {
    print_stat(module, &format!("not built, {} could not be built", dependency));
  }
  print_skipped(summary);
}

fn print_skipped(summary: &BuildSummary) {
  for module in &summary.skipped {
    print_stat(module, "up to date, skipped");
  }
}
