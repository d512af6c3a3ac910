//! Engine integration tests, driven through the public API with an injected
//! module type.

mod common;

mod build_tests;
mod lock_tests;
mod moduleset_tests;
