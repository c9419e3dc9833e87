//! The rule tree: the in-memory form of a whole validation program.
//!
//! This module provides:
//! - Node type definitions (`types` module, re-exported at this level)
//! - The fluent nested builder (`builder` module)
//! - Structural invariant checks and renumbering (`shape` module)

pub mod builder;
mod shape;
mod types;

pub use shape::TreeError;
pub use types::*;
