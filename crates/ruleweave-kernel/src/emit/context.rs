//! Emission context threaded through the code generator.
//!
//! The context is a value: nested scopes receive a modified copy and the
//! caller's copy is untouched when they return. The name counter is the one
//! piece of state shared across siblings and lives on the emitter instead.

use super::instr::{Label, PathTemplate, ValueRef};
use crate::tree::{Accessor, FailureMode};

#[derive(Debug, Clone)]
pub struct EmitContext {
    /// Accumulated error path for the current target.
    pub target_path: PathTemplate,
    pub parent_failure_mode: FailureMode,
    /// Jump target of the active halt scope.
    pub halt_label: Option<Label>,
    /// Emit the next check as an alternative of the previous one.
    pub chain_with_else: bool,
    /// Variable holding the value accessors are relative to.
    pub ambient: String,
}

impl EmitContext {
    /// The context at the procedure root.
    pub fn root(root_variable: &str, mode: FailureMode) -> Self {
        Self {
            target_path: PathTemplate::default(),
            parent_failure_mode: mode,
            halt_label: None,
            chain_with_else: false,
            ambient: root_variable.to_string(),
        }
    }

    /// Read `accessor` relative to the ambient value.
    pub fn read(&self, accessor: &Accessor) -> ValueRef {
        ValueRef {
            var: self.ambient.clone(),
            fields: accessor.fields.clone(),
        }
    }

    /// Apply the failure-mode transition for a node whose effective mode is
    /// `own`. Returns the child context and the label minted for this node,
    /// which the caller places after the node's code.
    pub fn enter(
        &self,
        own: FailureMode,
        needs_label: bool,
        mint: impl FnOnce() -> Label,
    ) -> (EmitContext, Option<Label>) {
        let mut child = self.clone();
        child.parent_failure_mode = own;
        child.chain_with_else = false;

        let new_scope = match (&self.halt_label, own, self.parent_failure_mode) {
            (None, FailureMode::Halt, _) => true,
            (Some(_), FailureMode::Halt, FailureMode::Continue) => true,
            (Some(_), FailureMode::Halt, FailureMode::Halt) => false,
            (Some(_), FailureMode::Continue, FailureMode::Continue) => false,
            (Some(_), FailureMode::Continue, FailureMode::Halt) => {
                child.halt_label = None;
                false
            }
            (None, FailureMode::Continue, _) => false,
        };
        if !new_scope {
            return (child, None);
        }

        if needs_label {
            let label = mint();
            child.halt_label = Some(label.clone());
            (child, Some(label))
        } else {
            child.halt_label = None;
            (child, None)
        }
    }

    /// A copy for an isolated subtree (an either alternative): no halt scope.
    pub fn isolated(&self) -> EmitContext {
        EmitContext {
            halt_label: None,
            parent_failure_mode: FailureMode::Continue,
            chain_with_else: false,
            ..self.clone()
        }
    }

    /// A copy for the elements of a collection.
    pub fn element(&self, item: &str, path: PathTemplate) -> EmitContext {
        EmitContext {
            target_path: path,
            ambient: item.to_string(),
            chain_with_else: false,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(n: &str) -> Label {
        Label(n.to_string())
    }

    #[test]
    fn halt_without_scope_mints_label() {
        let ctx = EmitContext::root("instance", FailureMode::Continue);
        let (child, minted) = ctx.enter(FailureMode::Halt, true, || label("halt_0"));
        assert_eq!(minted, Some(label("halt_0")));
        assert_eq!(child.halt_label, Some(label("halt_0")));
        assert_eq!(child.parent_failure_mode, FailureMode::Halt);
    }

    #[test]
    fn halt_without_need_mints_nothing() {
        let ctx = EmitContext::root("instance", FailureMode::Continue);
        let (child, minted) = ctx.enter(FailureMode::Halt, false, || label("unused"));
        assert!(minted.is_none());
        assert!(child.halt_label.is_none());
    }

    #[test]
    fn nested_halt_shares_label() {
        let ctx = EmitContext::root("instance", FailureMode::Continue);
        let (outer, _) = ctx.enter(FailureMode::Halt, true, || label("halt_0"));
        let (inner, minted) = outer.enter(FailureMode::Halt, true, || label("halt_1"));
        assert!(minted.is_none());
        assert_eq!(inner.halt_label, Some(label("halt_0")));
    }

    #[test]
    fn continue_inside_halt_drops_label() {
        let ctx = EmitContext::root("instance", FailureMode::Continue);
        let (outer, _) = ctx.enter(FailureMode::Halt, true, || label("halt_0"));
        let (inner, minted) = outer.enter(FailureMode::Continue, true, || label("halt_1"));
        assert!(minted.is_none());
        assert!(inner.halt_label.is_none());
        assert_eq!(outer.halt_label, Some(label("halt_0")));
    }

    #[test]
    fn caller_context_is_unchanged() {
        let ctx = EmitContext::root("instance", FailureMode::Continue);
        let (_child, _) = ctx.enter(FailureMode::Halt, true, || label("halt_0"));
        assert!(ctx.halt_label.is_none());
        assert_eq!(ctx.parent_failure_mode, FailureMode::Continue);
    }
}
