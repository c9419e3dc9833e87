//! Code generation: linked rule tree to [`Procedure`].
//!
//! One recursive pass over the tree. Each node first applies the
//! failure-mode transition (see [`EmitContext::enter`]), then emits its
//! kind-specific instructions, then places any halt label it minted.
//!
//! Generated names (`index_1_3`, `item_1_3`, `skip_4`, `halt_0`, ...) come
//! from one counter shared by the whole pass, so two compilations of the
//! same tree produce identical procedures.

mod context;
mod instr;

pub use context::EmitContext;
pub use instr::*;

use thiserror::Error;
use tracing::{debug, trace};

use crate::config::CompilerConfig;
use crate::message::{compile_message, Binding, MessageBindings, Slot};
use crate::tree::*;

/// A tree the emitter cannot compile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmitError {
    #[error("{location}: rule '{invocation}' was not linked")]
    Unlinked { location: String, invocation: String },
}

/// Whether a node needs its own halt label when it opens a halt scope.
///
/// Single checks and groups whose failure is one record stop by
/// themselves; a label is only worth minting for groups of siblings.
fn needs_label(node: &RuleNode) -> bool {
    match node {
        RuleNode::Leaf(_)
        | RuleNode::Target(_)
        | RuleNode::Delegate(_)
        | RuleNode::Either(_)
        | RuleNode::Polymorphic(_) => false,
        RuleNode::Collection(_)
        | RuleNode::Composite(_)
        | RuleNode::Conditional(_)
        | RuleNode::Scope(_) => node.can_fail(),
    }
}

/// Standard placeholders available to every message.
fn standard_bindings(target_name: &str) -> MessageBindings {
    MessageBindings::new()
        .with("PropertyName", Binding::Literal(target_name.into()))
        .with("PropertyValue", Binding::Runtime(Slot::AttemptedValue))
        .with("PropertyPath", Binding::Runtime(Slot::TargetPath))
        .with("TotalLength", Binding::Runtime(Slot::TotalLength))
}

/// Compiles one tree. Create one per tree; it is consumed by [`Emitter::emit`].
pub struct Emitter<'c> {
    config: &'c CompilerConfig,
    counter: usize,
    out: Vec<Instr>,
}

impl<'c> Emitter<'c> {
    pub fn new(config: &'c CompilerConfig) -> Self {
        Self {
            config,
            counter: 0,
            out: Vec::new(),
        }
    }

    /// Compile a fully linked tree.
    pub fn emit(mut self, tree: &RuleTree) -> Result<Procedure, EmitError> {
        let mode = tree.failure_mode.unwrap_or(self.config.default_failure_mode);
        let root = EmitContext::root(&self.config.root_variable, FailureMode::Continue);
        self.emit_scope(mode, &tree.nodes, &root, "nodes")?;

        debug!(
            tree = %tree.name,
            instructions = self.out.len(),
            names = self.counter,
            "emitted procedure"
        );
        Ok(Procedure::new(
            tree.name.clone(),
            tree.subject.clone(),
            self.config.root_variable.clone(),
            tree.leaf_rule_count(),
            self.out,
        ))
    }

    fn next_id(&mut self) -> usize {
        let n = self.counter;
        self.counter += 1;
        n
    }

    fn label(&mut self, prefix: &str) -> Label {
        Label(format!("{prefix}_{}", self.next_id()))
    }

    /// A list of siblings under an explicit failure mode.
    fn emit_scope(
        &mut self,
        mode: FailureMode,
        nodes: &[RuleNode],
        ctx: &EmitContext,
        location: &str,
    ) -> Result<(), EmitError> {
        let needs = nodes.iter().any(RuleNode::can_fail);
        let (inner, minted) = ctx.enter(mode, needs, || self.label("halt"));
        self.emit_list(nodes, &inner, location)?;
        if let Some(label) = minted {
            self.out.push(Instr::Label(label));
        }
        Ok(())
    }

    fn emit_list(
        &mut self,
        nodes: &[RuleNode],
        ctx: &EmitContext,
        location: &str,
    ) -> Result<(), EmitError> {
        for (i, node) in nodes.iter().enumerate() {
            self.emit_node(node, ctx, &format!("{location}[{i}]"))?;
        }
        Ok(())
    }

    fn emit_node(
        &mut self,
        node: &RuleNode,
        ctx: &EmitContext,
        location: &str,
    ) -> Result<(), EmitError> {
        let own = node.failure_mode().unwrap_or(ctx.parent_failure_mode);
        let (inner, minted) = ctx.enter(own, needs_label(node), || self.label("halt"));
        trace!(
            location,
            kind = node.kind_name(),
            depth = node.depth(),
            mode = %own,
            halt = ?inner.halt_label,
            "emit node"
        );

        match node {
            RuleNode::Leaf(leaf) => self.emit_check(leaf, &inner, location)?,
            RuleNode::Target(group) => {
                let chain = own == FailureMode::Halt && inner.halt_label.is_none();
                let mut rule_ctx = inner.clone();
                for (i, rule) in group.rules.iter().enumerate() {
                    self.emit_check(rule, &rule_ctx, &format!("{location}.rules[{i}]"))?;
                    rule_ctx.chain_with_else = chain;
                }
            }
            RuleNode::Delegate(group) => {
                let call = self.delegate_call(&group.validator, &group.target, None, &inner);
                self.out.push(Instr::Delegate(Box::new(call)));
            }
            RuleNode::Collection(group) => self.emit_collection(group, &inner, location)?,
            RuleNode::Composite(group) => {
                self.emit_list(&group.children, &inner, &format!("{location}.children"))?
            }
            RuleNode::Scope(group) => {
                self.emit_list(&group.children, &inner, &format!("{location}.children"))?
            }
            RuleNode::Conditional(group) => {
                let skip = self.label("skip");
                self.out.push(Instr::Guard {
                    test: test_for(&group.condition, &inner),
                    skip: skip.clone(),
                });
                self.emit_list(&group.children, &inner, &format!("{location}.children"))?;
                self.out.push(Instr::Label(skip));
            }
            RuleNode::Either(group) => self.emit_either(group, own, &inner, location)?,
            RuleNode::Polymorphic(group) => self.emit_polymorphic(group, &inner),
        }

        if let Some(label) = minted {
            self.out.push(Instr::Label(label));
        }
        Ok(())
    }

    fn emit_check(
        &mut self,
        leaf: &LeafRule,
        ctx: &EmitContext,
        location: &str,
    ) -> Result<(), EmitError> {
        let RuleRef::Resolved(resolved) = &leaf.rule else {
            return Err(EmitError::Unlinked {
                location: location.to_string(),
                invocation: leaf.rule.name().to_string(),
            });
        };

        let target_name = leaf
            .overrides
            .display_name
            .clone()
            .unwrap_or_else(|| leaf.target.display_name.clone());

        let mut bindings = standard_bindings(&target_name);
        for placeholder in &resolved.placeholders {
            let bound = leaf
                .arguments
                .iter()
                .enumerate()
                .find(|(_, arg)| arg.name == placeholder.parameter);
            if let Some((i, arg)) = bound {
                let binding = match &arg.value {
                    ArgValue::Literal(v) => Binding::Literal(v.clone()),
                    ArgValue::Read(_) => Binding::Runtime(Slot::Argument(i)),
                };
                bindings.bind(placeholder.token.clone(), binding);
            }
        }

        let template = leaf
            .overrides
            .message
            .as_deref()
            .unwrap_or(&resolved.message);

        let args = leaf
            .arguments
            .iter()
            .map(|arg| match &arg.value {
                ArgValue::Literal(v) => Operand::Literal(v.clone()),
                ArgValue::Read(accessor) => Operand::Read(ctx.read(accessor)),
            })
            .collect();

        let check = Check {
            rule: resolved.definition.clone(),
            predicate: resolved.predicate.clone(),
            type_args: resolved.generic_arguments.clone(),
            subject: ctx.read(&leaf.target.accessor),
            args,
            guard: leaf.overrides.guard.as_ref().map(|c| test_for(c, ctx)),
            chained: ctx.chain_with_else,
            report: Report {
                code: leaf
                    .overrides
                    .code
                    .clone()
                    .unwrap_or_else(|| resolved.code.clone()),
                message: compile_message(template, &bindings),
                severity: leaf
                    .overrides
                    .severity
                    .unwrap_or(self.config.default_severity),
                target_name,
                path: ctx.target_path.child(&leaf.target.path_segment),
                metadata: leaf.overrides.metadata.clone(),
            },
            halt: ctx.halt_label.clone(),
        };
        self.out.push(Instr::Check(Box::new(check)));
        Ok(())
    }

    fn delegate_call(
        &self,
        validator: &ValidatorRef,
        target: &Target,
        narrowed_to: Option<&str>,
        ctx: &EmitContext,
    ) -> DelegateCall {
        DelegateCall {
            validator: validator.clone(),
            subject: ctx.read(&target.accessor),
            path: ctx.target_path.child(&target.path_segment),
            narrowed_to: narrowed_to.map(str::to_string),
            halt: ctx.halt_label.clone(),
        }
    }

    /// A synthesized error against `target`.
    fn fail(&self, target: &Target, template: &str, code: &str, ctx: &EmitContext) -> Instr {
        let bindings = standard_bindings(&target.display_name);
        Instr::Fail {
            subject: ctx.read(&target.accessor),
            report: Report {
                code: code.to_string(),
                message: compile_message(template, &bindings),
                severity: self.config.default_severity,
                target_name: target.display_name.clone(),
                path: ctx.target_path.child(&target.path_segment),
                metadata: Vec::new(),
            },
            halt: ctx.halt_label.clone(),
        }
    }

    fn emit_collection(
        &mut self,
        group: &CollectionGroup,
        ctx: &EmitContext,
        location: &str,
    ) -> Result<(), EmitError> {
        let n = self.next_id();
        let index = format!("index_{}_{n}", group.depth);
        let item = format!("item_{}_{n}", group.depth);
        let body = Label(format!("loop_{n}"));
        let exit = Label(format!("loop_end_{n}"));

        let element_path = ctx
            .target_path
            .child(&group.target.path_segment)
            .index(&index);
        let element_ctx = ctx.element(&item, element_path);

        self.out.push(Instr::LoopStart {
            list: ctx.read(&group.target.accessor),
            index: index.clone(),
            item: item.clone(),
            exit: exit.clone(),
        });
        self.out.push(Instr::Label(body.clone()));
        match &group.body {
            CollectionBody::Rules(children) => {
                self.emit_list(children, &element_ctx, &format!("{location}.body"))?
            }
            CollectionBody::Delegate(delegate) => self.emit_node(
                &RuleNode::Delegate((**delegate).clone()),
                &element_ctx,
                &format!("{location}.body"),
            )?,
        }
        self.out.push(Instr::LoopNext { index, item, body });
        self.out.push(Instr::Label(exit));
        Ok(())
    }

    fn emit_either(
        &mut self,
        group: &EitherGroup,
        own: FailureMode,
        ctx: &EmitContext,
        location: &str,
    ) -> Result<(), EmitError> {
        let n = self.next_id();
        let ok = Label(format!("either_ok_{n}"));
        let isolated = ctx.isolated();

        // an empty alternative is not a way to pass
        let usable = group
            .alternatives
            .iter()
            .enumerate()
            .filter(|(_, alt)| !alt.children.is_empty());
        for (i, alt) in usable {
            self.out.push(Instr::Isolate);
            self.emit_scope(
                own,
                &alt.children,
                &isolated,
                &format!("{location}.alternatives[{i}].children"),
            )?;
            let capture = format!("either_{n}_{i}");
            self.out.push(Instr::Capture {
                name: capture.clone(),
            });
            self.out.push(Instr::JumpIfEmpty {
                capture,
                target: ok.clone(),
            });
        }

        let template = group.message.as_deref().unwrap_or(&self.config.either_message);
        let code = group.code.as_deref().unwrap_or(&self.config.either_code);
        let fail = self.fail(&group.target, template, code, ctx);
        self.out.push(fail);
        self.out.push(Instr::Label(ok));
        Ok(())
    }

    fn emit_polymorphic(&mut self, group: &PolymorphicGroup, ctx: &EmitContext) {
        let n = self.next_id();
        let end = Label(format!("poly_end_{n}"));
        let subject = ctx.read(&group.target.accessor);

        // a skipped null matches no type branch and falls through to otherwise
        if let NullBehavior::Fail { message } = &group.null_behavior {
            let present = Label(format!("poly_value_{n}"));
            self.out.push(Instr::JumpIfNotNull {
                subject: subject.clone(),
                target: present.clone(),
            });
            let template = message.as_deref().unwrap_or(&self.config.null_message);
            let fail = self.fail(&group.target, template, &self.config.null_code, ctx);
            self.out.push(fail);
            self.out.push(Instr::Jump(end.clone()));
            self.out.push(Instr::Label(present));
        }

        for (i, branch) in group.branches.iter().enumerate() {
            let next = Label(format!("poly_next_{n}_{i}"));
            self.out.push(Instr::JumpUnlessType {
                subject: subject.clone(),
                type_name: branch.type_name.clone(),
                target: next.clone(),
            });
            self.emit_branch(&branch.behavior, &group.target, Some(&branch.type_name), ctx);
            self.out.push(Instr::Jump(end.clone()));
            self.out.push(Instr::Label(next));
        }

        self.emit_branch(group.otherwise(), &group.target, None, ctx);
        self.out.push(Instr::Label(end));
    }

    fn emit_branch(
        &mut self,
        behavior: &BranchBehavior,
        target: &Target,
        type_name: Option<&str>,
        ctx: &EmitContext,
    ) {
        match behavior {
            BranchBehavior::Allow => {}
            BranchBehavior::Fail { message } => {
                let template = message
                    .as_deref()
                    .unwrap_or(&self.config.unsupported_type_message);
                let fail = self.fail(target, template, &self.config.unsupported_type_code, ctx);
                self.out.push(fail);
            }
            BranchBehavior::Delegate(validator) => {
                let call = self.delegate_call(validator, target, type_name, ctx);
                self.out.push(Instr::Delegate(Box::new(call)));
            }
        }
    }
}

fn test_for(condition: &Condition, ctx: &EmitContext) -> Test {
    Test {
        subject: ctx.read(&condition.accessor),
        test: condition.test.clone(),
        negate: condition.negate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::linker::Linker;
    use crate::tree::builder::{NodeBuilder, TreeBuilder};

    fn compile(tree: RuleTree) -> Procedure {
        let catalog = Catalog::builtin();
        let linked = Linker::new(&catalog).link(&tree).into_result().unwrap();
        Emitter::new(&CompilerConfig::default()).emit(&linked).unwrap()
    }

    fn checks(proc: &Procedure) -> Vec<&Check> {
        proc.instructions
            .iter()
            .filter_map(|i| match i {
                Instr::Check(c) => Some(c.as_ref()),
                _ => None,
            })
            .collect()
    }

    fn name() -> Target {
        Target::property("Name", TypeRef::string())
    }

    #[test]
    fn unlinked_rule_is_an_error() {
        let tree = TreeBuilder::new("V", TypeRef::named("User"))
            .rule_for(name(), |r| r.check("NotEmpty"))
            .build()
            .unwrap();
        let err = Emitter::new(&CompilerConfig::default()).emit(&tree).unwrap_err();
        assert_eq!(
            err,
            EmitError::Unlinked {
                location: "nodes[0].rules[0]".into(),
                invocation: "NotEmpty".into()
            }
        );
    }

    #[test]
    fn halt_chain_without_label_uses_else() {
        let proc = compile(
            TreeBuilder::new("V", TypeRef::named("User"))
                .rule_for(name(), |r| r.check("NotNull").check("NotEmpty").halt())
                .build()
                .unwrap(),
        );
        let checks = checks(&proc);
        assert!(!checks[0].chained);
        assert!(checks[1].chained);
        assert!(checks.iter().all(|c| c.halt.is_none()));
    }

    #[test]
    fn halt_root_jumps_to_end() {
        let proc = compile(
            TreeBuilder::new("V", TypeRef::named("User"))
                .halt()
                .rule_for(name(), |r| r.check("NotEmpty"))
                .rule_for(Target::property("Age", TypeRef::int()), |r| {
                    r.rule("GreaterThan", [Argument::literal(0)])
                })
                .build()
                .unwrap(),
        );
        let checks = checks(&proc);
        assert_eq!(checks[0].halt, Some(Label("halt_0".into())));
        assert_eq!(checks[1].halt, Some(Label("halt_0".into())));
        assert_eq!(proc.instructions.last(), Some(&Instr::Label(Label("halt_0".into()))));
    }

    #[test]
    fn literal_placeholders_compile_to_fixed_messages() {
        let proc = compile(
            TreeBuilder::new("V", TypeRef::named("User"))
                .rule_for(Target::property("Age", TypeRef::int()), |r| {
                    r.rule("GreaterThan", [Argument::literal(17)])
                })
                .build()
                .unwrap(),
        );
        let check = checks(&proc)[0];
        assert_eq!(
            check.report.message,
            crate::message::CompiledMessage::Fixed("'Age' must be greater than '17'.".into())
        );
        assert_eq!(check.type_args, vec![TypeRef::int()]);
    }

    #[test]
    fn collection_names_are_unique() {
        let items = || Target::property("Items", TypeRef::list_of(&TypeRef::string()));
        let proc = compile(
            TreeBuilder::new("V", TypeRef::named("Order"))
                .each(items(), |r| r.check("NotEmpty"))
                .each(items(), |r| r.check("NotNull"))
                .build()
                .unwrap(),
        );
        let loops: Vec<_> = proc
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instr::LoopStart { index, item, .. } => Some((index.clone(), item.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(loops.len(), 2);
        assert_ne!(loops[0], loops[1]);
        assert_eq!(checks(&proc)[0].report.path.to_string(), format!("Items[{}]", loops[0].0));
    }

    #[test]
    fn every_jump_target_exists() {
        let proc = compile(
            TreeBuilder::new("V", TypeRef::named("Owner"))
                .halt()
                .when(Condition::is_true(Accessor::field("Active")), |b| {
                    b.rule_for(name(), |r| r.check("NotEmpty"))
                })
                .either(Target::this("Owner", TypeRef::named("Owner")), |e| {
                    e.alternative("a", |b| b.rule_for(name(), |r| r.check("NotEmpty")))
                        .alternative("b", |b| {
                            b.rule_for(Target::property("Nick", TypeRef::string()), |r| r.check("NotEmpty"))
                        })
                })
                .polymorphic(Target::property("Pet", TypeRef::named("Animal")), |p| {
                    p.fail_on_null(None).allow("Cat").fail("Dog", None)
                })
                .build()
                .unwrap(),
        );
        for target in proc.jump_targets() {
            assert!(proc.label(target).is_some(), "missing label {target}");
        }
    }
}
