//! Built-in module types.
//!
//! Each backend exposes a `parse` function turning its descriptor element
//! into a [`Module`](crate::module::Module). [`register_builtins`] wires them
//! into a [`TypeRegistry`]: the two types nearly every moduleset uses are
//! registered eagerly, the rest are resolved on first use.

pub mod ant;
pub mod autotools;
pub(crate) mod common;
pub mod distutils;
pub mod linux;
pub mod meson;
pub mod meta;
pub mod perl;
pub mod pip;
pub mod pyproject;
pub mod system;
pub mod tarball;
pub mod waf;

use crate::module::registry::{ParseFn, TypeRegistry};

/// Registers every built-in backend under its descriptor tag.
pub fn register_builtins(registry: &mut TypeRegistry) {
  registry.register("autotools", autotools::parse);
  registry.register("metamodule", meta::parse);

  registry.register_lazy("ant", || ant::parse as ParseFn);
  registry.register_lazy("distutils", || distutils::parse as ParseFn);
  registry.register_lazy("linux", || linux::parse as ParseFn);
  registry.register_lazy("meson", || meson::parse as ParseFn);
  registry.register_lazy("perl", || perl::parse as ParseFn);
  registry.register_lazy("pip", || pip::parse as ParseFn);
  registry.register_lazy("pyproject", || pyproject::parse as ParseFn);
  registry.register_lazy("systemmodule", || system::parse as ParseFn);
  registry.register_lazy("tarball", || tarball::parse as ParseFn);
  registry.register_lazy("waf", || waf::parse as ParseFn);
}
