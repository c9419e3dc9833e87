//! The compile pipeline: shape check, link, emit.
//!
//! ```
//! use ruleweave_kernel::prelude::*;
//!
//! let tree = TreeBuilder::new("AgeValidator", TypeRef::named("Person"))
//!     .rule_for(Target::property("Age", TypeRef::int()), |r| {
//!         r.rule("GreaterThan", [Argument::literal(17)])
//!     })
//!     .build()
//!     .unwrap();
//!
//! let validator = Compiler::with_builtins().compile(&tree).unwrap();
//! let person = Value::from(Object::new("Person").with_field("Age", 12));
//! let result = validator.validate(&person, &Runtime::new()).unwrap();
//! assert_eq!(result.codes(), vec!["GreaterThan"]);
//! ```

use std::thread;

use thiserror::Error;
use tracing::{debug, info_span};

use crate::catalog::Catalog;
use crate::config::CompilerConfig;
use crate::emit::{EmitError, Emitter, Procedure};
use crate::linker::{LinkDiagnostic, LinkOutcome, Linker};
use crate::runtime::CompiledValidator;
use crate::tree::{RuleTree, TreeError};

/// Why a tree could not be compiled. No partial output is produced.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("malformed rule tree: {0}")]
    Shape(#[from] TreeError),

    #[error("{} unresolved rule(s):\n{}", .0.len(), diagnostics_list(.0))]
    Unresolved(Vec<LinkDiagnostic>),

    #[error("code generation failed: {0}")]
    Emit(#[from] EmitError),
}

fn diagnostics_list(diagnostics: &[LinkDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compiles rule trees against one catalog and configuration.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    catalog: Catalog,
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(catalog: Catalog, config: CompilerConfig) -> Self {
        Self { catalog, config }
    }

    /// The builtin catalog with the default configuration.
    pub fn with_builtins() -> Self {
        Self::new(Catalog::builtin(), CompilerConfig::default())
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Link without emitting.
    pub fn link(&self, tree: &RuleTree) -> LinkOutcome {
        Linker::new(&self.catalog).link(tree)
    }

    /// Compile a tree into its procedure.
    pub fn compile_procedure(&self, tree: &RuleTree) -> Result<Procedure, CompileError> {
        let _span = info_span!("compile", tree = %tree.name).entered();
        tree.check_shape()?;
        let linked = self.link(tree).into_result().map_err(CompileError::Unresolved)?;
        let procedure = Emitter::new(&self.config).emit(&linked)?;
        debug!(instructions = procedure.instructions.len(), "compiled");
        Ok(procedure)
    }

    /// Compile a tree into a runnable validator.
    pub fn compile(&self, tree: &RuleTree) -> Result<CompiledValidator, CompileError> {
        self.compile_procedure(tree).map(CompiledValidator::new)
    }

    /// Compile several trees in parallel, one thread per tree.
    ///
    /// Results are in input order.
    pub fn compile_all(&self, trees: &[RuleTree]) -> Vec<Result<CompiledValidator, CompileError>> {
        thread::scope(|scope| {
            let handles: Vec<_> = trees
                .iter()
                .map(|tree| scope.spawn(move || self.compile(tree)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::builder::{NodeBuilder, TreeBuilder};
    use crate::tree::{Argument, Target, TypeRef};

    fn tree(name: &str, rule: &str) -> RuleTree {
        TreeBuilder::new(name, TypeRef::named("User"))
            .rule_for(Target::property("Email", TypeRef::string()), |r| r.check(rule))
            .build()
            .unwrap()
    }

    #[test]
    fn unresolved_rules_stop_compilation() {
        let err = Compiler::with_builtins().compile(&tree("V", "IsPalindrome")).unwrap_err();
        match err {
            CompileError::Unresolved(diagnostics) => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].invocation, "IsPalindrome");
            }
            other => panic!("expected Unresolved, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_error_lists_every_diagnostic() {
        let tree = TreeBuilder::new("V", TypeRef::named("User"))
            .rule_for(Target::property("A", TypeRef::string()), |r| r.check("Nope"))
            .rule_for(Target::property("B", TypeRef::int()), |r| {
                r.rule("EmailAddress", [Argument::literal(1)])
            })
            .build()
            .unwrap();
        let message = Compiler::with_builtins().compile(&tree).unwrap_err().to_string();
        assert!(message.starts_with("2 unresolved rule(s):"), "{message}");
        assert!(message.contains("nodes[1].rules[0]"), "{message}");
    }

    #[test]
    fn compile_all_keeps_input_order() {
        let trees = vec![tree("A", "EmailAddress"), tree("B", "Missing"), tree("C", "NotEmpty")];
        let results = Compiler::with_builtins().compile_all(&trees);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().procedure().name, "A");
        assert!(matches!(results[1], Err(CompileError::Unresolved(_))));
        assert_eq!(results[2].as_ref().unwrap().procedure().name, "C");
    }

    #[test]
    fn config_root_variable_reaches_the_procedure() {
        let compiler = Compiler::with_builtins()
            .with_config(CompilerConfig::default().with_root_variable("subject"));
        let procedure = compiler.compile_procedure(&tree("V", "NotEmpty")).unwrap();
        assert_eq!(procedure.root_variable, "subject");
        assert!(procedure.to_string().starts_with("procedure V(subject: User)"));
    }
}
