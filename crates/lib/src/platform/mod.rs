//! Host platform queries: per-user directories and the process table.

pub mod paths;
pub mod process;
