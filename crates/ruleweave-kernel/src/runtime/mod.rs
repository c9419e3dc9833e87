//! Runtime for compiled procedures.
//!
//! - [`Machine`] steps through a [`Procedure`](crate::emit::Procedure),
//!   yielding at every delegate call so sync and async drivers share it
//! - [`PredicateRegistry`] / [`ValidatorRegistry`] supply predicates and
//!   delegate validators by name
//! - [`CompiledValidator`] wraps a procedure behind the [`Validator`] trait
//!
//! Validation failures are data. A [`RuntimeFault`] means the run itself
//! could not complete: an unknown predicate, a missing delegate, an async
//! delegate in a sync run, or cancellation.

mod machine;
mod predicates;
mod registry;
mod validator;

pub use machine::{run, run_async, DelegateRequest, Machine, Step};
pub use registry::{FnPredicate, Predicate, PredicateRegistry, Runtime, ValidatorRegistry};
pub use validator::{CompiledValidator, Validator};

use thiserror::Error;

/// A validation run that could not complete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeFault {
    #[error("unknown predicate '{0}'")]
    UnknownPredicate(String),

    #[error("predicate '{predicate}' failed at '{path}': {message}")]
    Predicate {
        predicate: String,
        path: String,
        message: String,
    },

    #[error("no validator registered for '{0}'")]
    UnknownValidator(String),

    #[error("validator '{0}' is async and cannot run synchronously")]
    AsyncInSyncRun(String),

    #[error("validation cancelled")]
    Cancelled,

    #[error("validator '{validator}' failed: {message}")]
    Delegate { validator: String, message: String },

    #[error("malformed procedure: {0}")]
    Malformed(String),
}
