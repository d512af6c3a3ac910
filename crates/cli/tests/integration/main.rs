//! End-to-end runs of the `modbuild` binary against real shell commands.

mod common;

mod build_tests;
mod sysdeps_tests;
