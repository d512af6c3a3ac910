//! Running modules.
//!
//! # Submodules
//!
//! - [`exec`] - Command execution: the shell executor and a recording double
//! - [`context`] - `BuildContext`, the interface phases run against
//! - [`runner`] - Per-module phase state machine and error menu
//! - [`policy`] - Whether an installed module may be skipped
//! - [`install`] - DESTDIR staging, promotion and orphan cleanup
//! - [`driver`] - The sequential loop over a build set

pub mod context;
pub mod driver;
pub mod exec;
pub mod install;
pub mod policy;
pub mod runner;

pub use context::{BuildContext, BuildObserver};
pub use driver::{BuildSummary, DriverError, build};
pub use runner::{ErrorChoice, ErrorHandler, NonInteractive, RunOutcome};
