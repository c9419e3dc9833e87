//! ruleweave-kernel: compiles declarative rule trees into validation
//! procedures and runs them.
//!
//! This crate provides:
//!
//! - **Catalog**: named rule definitions with typed signatures and message templates
//! - **Tree**: the rule tree IR, its fluent builder, and shape checks
//! - **Linker**: resolves weakly named rule invocations by signature
//! - **Message**: compiles message templates into fixed strings or formatters
//! - **Emit**: generates a flat, labelled instruction sequence per tree
//! - **Runtime**: a step machine running procedures, sync or async
//! - **Compiler**: the shape-check, link, emit pipeline

pub mod catalog;
pub mod compiler;
pub mod config;
pub mod emit;
pub mod linker;
pub mod message;
pub mod runtime;
pub mod tree;

pub use compiler::{CompileError, Compiler};
pub use config::{CompilerConfig, ConfigError};

/// Everything needed to build, compile and run a validator.
pub mod prelude {
    pub use crate::catalog::{Catalog, Param, RuleDefinition};
    pub use crate::compiler::{CompileError, Compiler};
    pub use crate::config::CompilerConfig;
    pub use crate::runtime::{CompiledValidator, Runtime, RuntimeFault, Validator};
    pub use crate::tree::builder::{NodeBuilder, TreeBuilder};
    pub use crate::tree::{
        Accessor, Argument, BranchBehavior, Condition, FailureMode, RuleTree, Target, TypeRef,
        ValidatorRef,
    };
    pub use ruleweave_types::{Object, Severity, ValidationError, ValidationResult, Value};
}
