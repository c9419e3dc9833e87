//! Fluent nested builder for rule trees.
//!
//! ```
//! use ruleweave_kernel::prelude::*;
//!
//! let tree = TreeBuilder::new("CustomerValidator", TypeRef::named("Customer"))
//!     .rule_for(Target::property("Name", TypeRef::string()), |r| {
//!         r.check("NotEmpty")
//!             .rule("MaximumLength", [Argument::literal(50)])
//!             .halt()
//!     })
//!     .each(
//!         Target::property("Tags", TypeRef::list_of(&TypeRef::string())),
//!         |r| r.check("NotEmpty"),
//!     )
//!     .build()
//!     .unwrap();
//! assert_eq!(tree.leaf_rule_count(), 3);
//! ```
//!
//! Depths and leaf counts are computed as nodes are added. Shapes that can
//! never validate anything (an empty collection body, an either group with
//! fewer than two alternatives, ...) are reported by `build()`.

use ruleweave_types::{Severity, Value};

use super::shape::{polymorphic_leaf_count, sum_counts, TreeError};
use super::types::*;
use crate::catalog::RuleDefinition;

/// Builds a whole [`RuleTree`].
pub struct TreeBuilder {
    name: String,
    subject: TypeRef,
    failure_mode: Option<FailureMode>,
    body: BodyBuilder,
}

impl TreeBuilder {
    pub fn new(name: impl Into<String>, subject: TypeRef) -> Self {
        Self {
            name: name.into(),
            subject,
            failure_mode: None,
            body: BodyBuilder::new(0, "nodes".to_string()),
        }
    }

    /// Set the root failure mode.
    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = Some(mode);
        self
    }

    /// Stop the whole validator at the first failure.
    pub fn halt(self) -> Self {
        self.failure_mode(FailureMode::Halt)
    }

    pub fn build(self) -> Result<RuleTree, TreeError> {
        let nodes = self.body.finish()?;
        Ok(RuleTree {
            name: self.name,
            subject: self.subject,
            nodes,
            failure_mode: self.failure_mode,
        })
    }
}

/// An ordered list of sibling nodes at one depth.
pub struct BodyBuilder {
    depth: usize,
    location: String,
    nodes: Vec<RuleNode>,
    error: Option<TreeError>,
}

impl BodyBuilder {
    fn new(depth: usize, location: String) -> Self {
        Self {
            depth,
            location,
            nodes: Vec::new(),
            error: None,
        }
    }

    /// Location of the next node to be pushed.
    fn next_location(&self) -> String {
        format!("{}[{}]", self.location, self.nodes.len())
    }

    fn child(&self, depth: usize, suffix: &str) -> BodyBuilder {
        BodyBuilder::new(depth, format!("{}{}", self.next_location(), suffix))
    }

    fn record(&mut self, error: TreeError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push(&mut self, node: RuleNode) {
        self.nodes.push(node);
    }

    /// Build a nested body, recording its error on failure.
    fn nested(
        &mut self,
        depth: usize,
        suffix: &str,
        build: impl FnOnce(BodyBuilder) -> BodyBuilder,
    ) -> Option<Vec<RuleNode>> {
        match build(self.child(depth, suffix)).finish() {
            Ok(nodes) => Some(nodes),
            Err(e) => {
                self.record(e);
                None
            }
        }
    }

    fn finish(self) -> Result<Vec<RuleNode>, TreeError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.nodes),
        }
    }
}

/// Fluent node-adding operations shared by [`TreeBuilder`] and nested bodies.
pub trait NodeBuilder: Sized {
    #[doc(hidden)]
    fn body_mut(&mut self) -> &mut BodyBuilder;

    /// A rule chain on one target.
    fn rule_for(mut self, target: Target, chain: impl FnOnce(RuleChain) -> RuleChain) -> Self {
        let body = self.body_mut();
        let chain = chain(RuleChain::new(target, body.depth));
        if chain.rules.is_empty() {
            let location = body.next_location();
            body.record(TreeError::EmptyTargetGroup {
                location,
                target: chain.target.display_name,
            });
            return self;
        }
        let leaf_rule_count = chain.rules.len();
        body.push(RuleNode::Target(TargetGroup {
            target: chain.target,
            rules: chain.rules,
            depth: body.depth,
            failure_mode: chain.failure_mode,
            leaf_rule_count,
        }));
        self
    }

    /// A single standalone rule.
    fn rule<I>(mut self, target: Target, invocation: &str, args: I) -> Self
    where
        I: IntoIterator<Item = Argument>,
    {
        let body = self.body_mut();
        let mut chain = RuleChain::new(target, body.depth).rule(invocation, args);
        if let Some(leaf) = chain.rules.pop() {
            body.push(RuleNode::Leaf(leaf));
        }
        self
    }

    /// Nested rules applied to every element of a collection target.
    fn rule_for_each(mut self, target: Target, build: impl FnOnce(BodyBuilder) -> BodyBuilder) -> Self {
        let body = self.body_mut();
        let depth = body.depth;
        let Some(children) = body.nested(depth + 1, ".body", build) else {
            return self;
        };
        if children.is_empty() {
            let location = body.next_location();
            body.record(TreeError::EmptyCollection {
                location,
                target: target.display_name,
            });
            return self;
        }
        let leaf_rule_count = sum_counts(&children);
        body.push(RuleNode::Collection(CollectionGroup {
            target,
            body: CollectionBody::Rules(children),
            depth,
            failure_mode: None,
            leaf_rule_count,
        }));
        self
    }

    /// A rule chain applied to every element itself.
    fn each(self, target: Target, chain: impl FnOnce(RuleChain) -> RuleChain) -> Self {
        let element = target.element();
        self.rule_for_each(target, move |b| b.rule_for(element, chain))
    }

    /// Delegate every element to another validator.
    fn for_each_delegate(mut self, target: Target, validator: ValidatorRef) -> Self {
        let body = self.body_mut();
        let delegate = DelegateGroup {
            target: target.element(),
            validator,
            depth: body.depth + 1,
            failure_mode: None,
        };
        body.push(RuleNode::Collection(CollectionGroup {
            target,
            body: CollectionBody::Delegate(Box::new(delegate)),
            depth: body.depth,
            failure_mode: None,
            leaf_rule_count: 1,
        }));
        self
    }

    /// Delegate a target to another validator.
    fn delegate(mut self, target: Target, validator: ValidatorRef) -> Self {
        let body = self.body_mut();
        body.push(RuleNode::Delegate(DelegateGroup {
            target,
            validator,
            depth: body.depth,
            failure_mode: None,
        }));
        self
    }

    /// Children that only run when `condition` holds.
    fn when(mut self, condition: Condition, build: impl FnOnce(BodyBuilder) -> BodyBuilder) -> Self {
        let body = self.body_mut();
        let depth = body.depth;
        if let Some(children) = body.nested(depth, ".children", build) {
            let leaf_rule_count = sum_counts(&children);
            body.push(RuleNode::Conditional(ConditionalGroup {
                condition,
                children,
                depth,
                failure_mode: None,
                leaf_rule_count,
            }));
        }
        self
    }

    /// Children that only run when `condition` does not hold.
    fn unless(self, condition: Condition, build: impl FnOnce(BodyBuilder) -> BodyBuilder) -> Self {
        self.when(condition.negated(), build)
    }

    /// Group siblings (a callback body).
    fn group(mut self, build: impl FnOnce(BodyBuilder) -> BodyBuilder) -> Self {
        let body = self.body_mut();
        let depth = body.depth;
        if let Some(children) = body.nested(depth, ".children", build) {
            let leaf_rule_count = sum_counts(&children);
            body.push(RuleNode::Composite(CompositeGroup {
                children,
                depth,
                failure_mode: None,
                leaf_rule_count,
            }));
        }
        self
    }

    /// Establish a failure mode for the nested nodes.
    fn scope(mut self, mode: FailureMode, build: impl FnOnce(BodyBuilder) -> BodyBuilder) -> Self {
        let body = self.body_mut();
        let depth = body.depth;
        if let Some(children) = body.nested(depth, ".children", build) {
            let leaf_rule_count = sum_counts(&children);
            body.push(RuleNode::Scope(FailureModeScope {
                mode,
                children,
                depth,
                leaf_rule_count,
            }));
        }
        self
    }

    /// Passes if any alternative passes.
    fn either(mut self, target: Target, build: impl FnOnce(EitherBuilder) -> EitherBuilder) -> Self {
        let body = self.body_mut();
        let location = body.next_location();
        let either = build(EitherBuilder::new(body.depth, location.clone()));
        if let Some(e) = either.error {
            body.record(e);
            return self;
        }
        let usable = either
            .alternatives
            .iter()
            .filter(|alt| !alt.children.is_empty())
            .count();
        if usable < 2 {
            body.record(TreeError::TooFewAlternatives {
                location,
                target: target.display_name,
                usable,
            });
            return self;
        }
        let leaf_rule_count = either
            .alternatives
            .iter()
            .map(|alt| sum_counts(&alt.children))
            .sum();
        body.push(RuleNode::Either(EitherGroup {
            target,
            alternatives: either.alternatives,
            message: either.message,
            code: either.code,
            depth: body.depth,
            failure_mode: None,
            leaf_rule_count,
        }));
        self
    }

    /// Type dispatch on the runtime type of `target`.
    fn polymorphic(
        mut self,
        target: Target,
        build: impl FnOnce(PolymorphicBuilder) -> PolymorphicBuilder,
    ) -> Self {
        let body = self.body_mut();
        let poly = build(PolymorphicBuilder::default());
        if poly.branches.is_empty() {
            let location = body.next_location();
            body.record(TreeError::EmptyPolymorphic {
                location,
                target: target.display_name,
            });
            return self;
        }
        let otherwise = poly.otherwise.clone().unwrap_or_default();
        let leaf_rule_count = polymorphic_leaf_count(&poly.branches, &otherwise);
        body.push(RuleNode::Polymorphic(PolymorphicGroup {
            target,
            null_behavior: poly.null_behavior,
            branches: poly.branches,
            otherwise: poly.otherwise,
            depth: body.depth,
            failure_mode: None,
            leaf_rule_count,
        }));
        self
    }

    /// Set the failure mode of the node added last.
    fn cascade(mut self, mode: FailureMode) -> Self {
        if let Some(node) = self.body_mut().nodes.last_mut() {
            match node {
                RuleNode::Leaf(n) => n.failure_mode = Some(mode),
                RuleNode::Target(n) => n.failure_mode = Some(mode),
                RuleNode::Delegate(n) => n.failure_mode = Some(mode),
                RuleNode::Collection(n) => n.failure_mode = Some(mode),
                RuleNode::Composite(n) => n.failure_mode = Some(mode),
                RuleNode::Conditional(n) => n.failure_mode = Some(mode),
                RuleNode::Either(n) => n.failure_mode = Some(mode),
                RuleNode::Polymorphic(n) => n.failure_mode = Some(mode),
                RuleNode::Scope(n) => n.mode = mode,
            }
        }
        self
    }
}

impl NodeBuilder for TreeBuilder {
    fn body_mut(&mut self) -> &mut BodyBuilder {
        &mut self.body
    }
}

impl NodeBuilder for BodyBuilder {
    fn body_mut(&mut self) -> &mut BodyBuilder {
        self
    }
}

/// A chain of rules on one target. Overrides apply to the rule added last.
pub struct RuleChain {
    target: Target,
    depth: usize,
    rules: Vec<LeafRule>,
    failure_mode: Option<FailureMode>,
}

impl RuleChain {
    fn new(target: Target, depth: usize) -> Self {
        Self {
            target,
            depth,
            rules: Vec::new(),
            failure_mode: None,
        }
    }

    fn push(mut self, rule: RuleRef, arguments: Vec<Argument>) -> Self {
        self.rules.push(LeafRule {
            target: self.target.clone(),
            rule,
            arguments,
            overrides: Overrides::default(),
            depth: self.depth,
            failure_mode: None,
        });
        self
    }

    /// A weak rule invocation, resolved later by the linker.
    pub fn rule<I>(self, invocation: &str, args: I) -> Self
    where
        I: IntoIterator<Item = Argument>,
    {
        let arguments = args
            .into_iter()
            .enumerate()
            .map(|(i, mut arg)| {
                arg.name = format!("arg{}", i + 1);
                arg
            })
            .collect();
        self.push(RuleRef::weak(invocation), arguments)
    }

    /// A weak rule invocation without arguments.
    pub fn check(self, invocation: &str) -> Self {
        self.rule(invocation, [])
    }

    /// A rule already bound to a definition.
    pub fn rule_with<I>(self, definition: &RuleDefinition, args: I) -> Self
    where
        I: IntoIterator<Item = Argument>,
    {
        let arguments = args
            .into_iter()
            .zip(definition.signature.params.iter().skip(1))
            .map(|(mut arg, param)| {
                arg.name = param.name.clone();
                arg
            })
            .collect();
        self.push(RuleRef::Resolved(definition.resolve(Vec::new())), arguments)
    }

    fn last(&mut self) -> Option<&mut Overrides> {
        self.rules.last_mut().map(|r| &mut r.overrides)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        if let Some(o) = self.last() {
            o.message = Some(message.into());
        }
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        if let Some(o) = self.last() {
            o.code = Some(code.into());
        }
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        if let Some(o) = self.last() {
            o.severity = Some(severity);
        }
        self
    }

    /// Override the target display name for the last rule.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        if let Some(o) = self.last() {
            o.display_name = Some(name.into());
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(o) = self.last() {
            o.metadata.push((key.into(), value.into()));
        }
        self
    }

    /// Only run the last rule when `condition` holds.
    pub fn when(mut self, condition: Condition) -> Self {
        if let Some(o) = self.last() {
            o.guard = Some(condition);
        }
        self
    }

    pub fn unless(self, condition: Condition) -> Self {
        self.when(condition.negated())
    }

    /// Stop this chain at the first failure.
    pub fn halt(mut self) -> Self {
        self.failure_mode = Some(FailureMode::Halt);
        self
    }

    /// Collect every failure of this chain.
    pub fn cont(mut self) -> Self {
        self.failure_mode = Some(FailureMode::Continue);
        self
    }
}

/// Alternatives of an either group.
pub struct EitherBuilder {
    depth: usize,
    location: String,
    alternatives: Vec<Alternative>,
    message: Option<String>,
    code: Option<String>,
    error: Option<TreeError>,
}

impl EitherBuilder {
    fn new(depth: usize, location: String) -> Self {
        Self {
            depth,
            location,
            alternatives: Vec::new(),
            message: None,
            code: None,
            error: None,
        }
    }

    pub fn alternative(
        mut self,
        name: impl Into<String>,
        build: impl FnOnce(BodyBuilder) -> BodyBuilder,
    ) -> Self {
        let location = format!("{}.alternatives[{}].children", self.location, self.alternatives.len());
        match build(BodyBuilder::new(self.depth, location)).finish() {
            Ok(children) => self.alternatives.push(Alternative {
                name: name.into(),
                children,
            }),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Branches of a polymorphic group, matched in declaration order.
#[derive(Default)]
pub struct PolymorphicBuilder {
    null_behavior: NullBehavior,
    branches: Vec<TypeBranch>,
    otherwise: Option<BranchBehavior>,
}

impl PolymorphicBuilder {
    /// Report null values instead of skipping them.
    pub fn fail_on_null(mut self, message: Option<&str>) -> Self {
        self.null_behavior = NullBehavior::Fail {
            message: message.map(str::to_string),
        };
        self
    }

    pub fn allow(self, type_name: impl Into<String>) -> Self {
        self.branch(type_name, BranchBehavior::Allow)
    }

    pub fn fail(self, type_name: impl Into<String>, message: Option<&str>) -> Self {
        self.branch(
            type_name,
            BranchBehavior::Fail {
                message: message.map(str::to_string),
            },
        )
    }

    pub fn delegate(self, type_name: impl Into<String>, validator: ValidatorRef) -> Self {
        self.branch(type_name, BranchBehavior::Delegate(validator))
    }

    pub fn branch(mut self, type_name: impl Into<String>, behavior: BranchBehavior) -> Self {
        self.branches.push(TypeBranch {
            type_name: type_name.into(),
            behavior,
        });
        self
    }

    /// Fallback for values no branch matched.
    pub fn otherwise(mut self, behavior: BranchBehavior) -> Self {
        self.otherwise = Some(behavior);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> Target {
        Target::property("Name", TypeRef::string())
    }

    #[test]
    fn chain_numbers_arguments_and_sets_overrides() {
        let tree = TreeBuilder::new("V", TypeRef::named("User"))
            .rule_for(name(), |r| {
                r.rule("Length", [Argument::literal(1), Argument::literal(10)])
                    .with_code("NAME_LEN")
                    .with_severity(Severity::Warning)
                    .halt()
            })
            .build()
            .unwrap();
        let RuleNode::Target(group) = &tree.nodes[0] else {
            panic!("expected target group");
        };
        assert_eq!(group.failure_mode, Some(FailureMode::Halt));
        let rule = &group.rules[0];
        assert_eq!(rule.arguments[0].name, "arg1");
        assert_eq!(rule.arguments[1].name, "arg2");
        assert_eq!(rule.overrides.code.as_deref(), Some("NAME_LEN"));
        assert_eq!(rule.overrides.severity, Some(Severity::Warning));
    }

    #[test]
    fn collection_children_are_one_level_deeper() {
        let items = Target::property("Items", TypeRef::list_of(&TypeRef::named("Item")));
        let tree = TreeBuilder::new("V", TypeRef::named("Order"))
            .rule_for_each(items, |b| {
                b.rule_for(Target::property("Sku", TypeRef::string()), |r| r.check("NotEmpty"))
                    .rule_for_each(
                        Target::property("Tags", TypeRef::list_of(&TypeRef::string())),
                        |b| b.rule(Target::this("Tags", TypeRef::string()), "NotEmpty", []),
                    )
            })
            .build()
            .unwrap();
        tree.check_shape().unwrap();
        assert_eq!(tree.leaf_rule_count(), 2);
        let RuleNode::Collection(outer) = &tree.nodes[0] else {
            panic!("expected collection");
        };
        let CollectionBody::Rules(children) = &outer.body else {
            panic!("expected rules");
        };
        assert_eq!(children[1].depth(), 1);
        let RuleNode::Collection(inner) = &children[1] else {
            panic!("expected nested collection");
        };
        let CollectionBody::Rules(inner_children) = &inner.body else {
            panic!("expected rules");
        };
        assert_eq!(inner_children[0].depth(), 2);
    }

    #[test]
    fn empty_collection_is_rejected() {
        let err = TreeBuilder::new("V", TypeRef::named("Order"))
            .rule_for(name(), |r| r.check("NotEmpty"))
            .rule_for_each(
                Target::property("Items", TypeRef::list_of(&TypeRef::named("Item"))),
                |b| b,
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeError::EmptyCollection { ref location, .. } if location == "nodes[1]"));
    }

    #[test]
    fn single_alternative_either_is_rejected() {
        let err = TreeBuilder::new("V", TypeRef::named("Contact"))
            .either(Target::this("Contact", TypeRef::named("Contact")), |e| {
                e.alternative("email", |b| {
                    b.rule_for(Target::property("Email", TypeRef::string()), |r| r.check("NotEmpty"))
                })
                .alternative("empty", |b| b)
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, TreeError::TooFewAlternatives { usable: 1, .. }));
    }

    #[test]
    fn nested_errors_surface_from_build() {
        let err = TreeBuilder::new("V", TypeRef::named("Order"))
            .when(Condition::is_true(Accessor::field("Active")), |b| {
                b.polymorphic(Target::property("Pet", TypeRef::named("Animal")), |p| p)
            })
            .build()
            .unwrap_err();
        assert!(
            matches!(err, TreeError::EmptyPolymorphic { ref location, .. } if location == "nodes[0].children[0]")
        );
    }

    #[test]
    fn polymorphic_counts_delegate_branches() {
        let tree = TreeBuilder::new("V", TypeRef::named("Owner"))
            .polymorphic(Target::property("Pet", TypeRef::named("Animal")), |p| {
                p.allow("Cat")
                    .delegate("Dog", ValidatorRef::instance("DogValidator"))
                    .otherwise(BranchBehavior::Fail { message: None })
            })
            .build()
            .unwrap();
        assert_eq!(tree.leaf_rule_count(), 1);
        tree.check_shape().unwrap();
    }

    #[test]
    fn cascade_sets_last_node_mode() {
        let tree = TreeBuilder::new("V", TypeRef::named("Order"))
            .each(
                Target::property("Lines", TypeRef::list_of(&TypeRef::string())),
                |r| r.check("NotEmpty"),
            )
            .cascade(FailureMode::Halt)
            .build()
            .unwrap();
        assert_eq!(tree.nodes[0].failure_mode(), Some(FailureMode::Halt));
    }
}
