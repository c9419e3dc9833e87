//! ruleweave-types: pure data shared by the ruleweave compiler, its runtime,
//! and callers of compiled validators.
//!
//! - [`Value`]: the runtime value graph a compiled procedure validates
//! - [`ValidationError`]: one structured failure record
//! - [`ValidationResult`]: the outcome of a validation run

mod record;
mod value;

pub use record::{Severity, ValidationError, ValidationResult};
pub use value::{Object, Value};
