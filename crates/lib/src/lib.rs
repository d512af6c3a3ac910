//! modbuild-lib: the engine behind `modbuild`
//!
//! This crate builds a set of interdependent source modules, in dependency
//! order, into a shared install prefix:
//! - `moduleset`: descriptor loading, reference resolution and topological order
//! - `module`: modules, phase tables, the type registry and branch handles
//! - `modtypes`: the built-in backends (autotools, meson, tarball, ...)
//! - `build`: the phase runner, DESTDIR install engine and sequential driver
//! - `packagedb`: the lock-guarded record of what is installed where

pub mod build;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod lock;
pub mod modtypes;
pub mod module;
pub mod moduleset;
pub mod packagedb;
pub mod platform;
pub mod util;
