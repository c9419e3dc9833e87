//! Rule tree types.
//!
//! The tree is built once by a front-end (or the fluent builder), linked
//! against the catalog, then compiled. Every pass produces a new tree; nodes
//! are never mutated in place.

use std::fmt;

use serde::{Deserialize, Serialize};

use ruleweave_types::{Severity, Value};

use crate::catalog::Placeholder;

/// A semantic type as the rule definitions see it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    #[serde(default)]
    pub nullable: bool,
    /// An unresolved generic parameter (`T`).
    #[serde(default)]
    pub generic: bool,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            generic: false,
        }
    }

    /// A generic parameter such as `T`.
    pub fn generic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            generic: true,
        }
    }

    pub fn string() -> Self {
        Self::named("string")
    }

    pub fn int() -> Self {
        Self::named("int")
    }

    pub fn float() -> Self {
        Self::named("float")
    }

    pub fn bool() -> Self {
        Self::named("bool")
    }

    /// `list<elem>`
    pub fn list_of(elem: &TypeRef) -> Self {
        Self::named(format!("list<{}>", elem.name))
    }

    /// The nullable form of this type.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The same type with nullability stripped.
    pub fn without_nullability(&self) -> Self {
        Self {
            name: self.name.clone(),
            nullable: false,
            generic: self.generic,
        }
    }

    /// Element type of a `list<...>` type.
    pub fn element_type(&self) -> Option<TypeRef> {
        self.name
            .strip_prefix("list<")
            .and_then(|rest| rest.strip_suffix('>'))
            .map(TypeRef::named)
    }

    /// The semantic type of a literal value.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::named("null"),
            Value::Bool(_) => Self::bool(),
            Value::Int(_) => Self::int(),
            Value::Float(_) => Self::float(),
            Value::String(_) => Self::string(),
            Value::List(_) => Self::named("list"),
            Value::Object(o) => Self::named(o.type_name.clone()),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

/// How a target's value is read, relative to the ambient value.
///
/// An empty accessor reads the ambient value itself (a collection element,
/// or the root instance).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Accessor {
    pub fields: Vec<String>,
}

impl Accessor {
    /// The ambient value itself.
    pub fn this() -> Self {
        Self::default()
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self {
            fields: vec![name.into()],
        }
    }

    pub fn path<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_this(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render the accessor expression against a root variable name.
    pub fn render(&self, root: &str) -> String {
        let mut out = root.to_string();
        for field in &self.fields {
            out.push('.');
            out.push_str(field);
        }
        out
    }
}

/// What is being validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub accessor: Accessor,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    pub display_name: String,
    /// Contribution to the error path; empty for the ambient value.
    #[serde(default)]
    pub path_segment: String,
}

impl Target {
    /// A direct property of the ambient value.
    pub fn property(name: impl Into<String>, ty: TypeRef) -> Self {
        let name = name.into();
        Self {
            accessor: Accessor::field(name.clone()),
            ty,
            display_name: name.clone(),
            path_segment: name,
        }
    }

    /// A nested property chain such as `Address.City`.
    pub fn nested<I, S>(fields: I, ty: TypeRef) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let accessor = Accessor::path(fields);
        let display_name = accessor.fields.last().cloned().unwrap_or_default();
        let path_segment = accessor.fields.join(".");
        Self {
            accessor,
            ty,
            display_name,
            path_segment,
        }
    }

    /// The ambient value itself, shown under `display_name`.
    pub fn this(display_name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            accessor: Accessor::this(),
            ty,
            display_name: display_name.into(),
            path_segment: String::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// The element target of a collection target.
    pub fn element(&self) -> Target {
        let ty = self
            .ty
            .element_type()
            .unwrap_or_else(|| TypeRef::generic("TElement"));
        Target::this(self.display_name.clone(), ty)
    }
}

/// Stop at the first failure, or collect every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    Halt,
    #[default]
    Continue,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureMode::Halt => write!(f, "halt"),
            FailureMode::Continue => write!(f, "continue"),
        }
    }
}

/// A runtime boolean guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub accessor: Accessor,
    pub test: ConditionTest,
    #[serde(default)]
    pub negate: bool,
}

/// What a condition checks about the value it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionTest {
    Truthy,
    NotNull,
    /// A registered predicate with literal arguments.
    Predicate {
        key: String,
        #[serde(default)]
        args: Vec<Value>,
    },
}

impl Condition {
    /// True when the field is truthy.
    pub fn is_true(accessor: Accessor) -> Self {
        Self {
            accessor,
            test: ConditionTest::Truthy,
            negate: false,
        }
    }

    pub fn not_null(accessor: Accessor) -> Self {
        Self {
            accessor,
            test: ConditionTest::NotNull,
            negate: false,
        }
    }

    pub fn predicate(accessor: Accessor, key: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            accessor,
            test: ConditionTest::Predicate {
                key: key.into(),
                args,
            },
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

/// Where an argument's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgValue {
    /// Known when the tree is built.
    Literal(Value),
    /// Read from the ambient value at validation time.
    Read(Accessor),
}

/// An argument captured at a rule invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Positional until linking renames it to the definition's parameter.
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    pub value: ArgValue,
}

impl Argument {
    /// A literal argument; its type is taken from the value.
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            name: String::new(),
            ty: TypeRef::of_value(&value),
            value: ArgValue::Literal(value),
        }
    }

    /// An argument read from the ambient value at validation time.
    pub fn read(accessor: Accessor, ty: TypeRef) -> Self {
        Self {
            name: String::new(),
            ty,
            value: ArgValue::Read(accessor),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.value, ArgValue::Literal(_))
    }
}

/// A rule reference, weak until linked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleRef {
    /// Invoked by bare name; resolved by signature during linking.
    Weak { invocation: String },
    Resolved(ResolvedRule),
}

impl RuleRef {
    pub fn weak(invocation: impl Into<String>) -> Self {
        RuleRef::Weak {
            invocation: invocation.into(),
        }
    }

    /// The invocation or definition name.
    pub fn name(&self) -> &str {
        match self {
            RuleRef::Weak { invocation } => invocation,
            RuleRef::Resolved(r) => &r.definition,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, RuleRef::Resolved(_))
    }
}

/// What linking copied from the winning definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRule {
    pub definition: String,
    pub predicate: String,
    pub message: String,
    pub code: String,
    #[serde(default)]
    pub placeholders: Vec<Placeholder>,
    /// Reified generic arguments, in the definition's slot order.
    #[serde(default)]
    pub generic_arguments: Vec<TypeRef>,
}

/// Per-rule overrides set through the builder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<(String, Value)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Condition>,
}

/// One predicate check against a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRule {
    pub target: Target,
    pub rule: RuleRef,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    #[serde(default)]
    pub overrides: Overrides,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
}

impl LeafRule {
    /// Observed argument types with the target type prepended.
    pub fn observed_signature(&self) -> Vec<TypeRef> {
        std::iter::once(self.target.ty.clone())
            .chain(self.arguments.iter().map(|a| a.ty.clone()))
            .collect()
    }
}

/// A property-level rule chain: leaf rules sharing one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub target: Target,
    pub rules: Vec<LeafRule>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
    #[serde(default)]
    pub leaf_rule_count: usize,
}

/// Whether a delegate validator is an instance or resolved by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegateScope {
    #[default]
    Instance,
    Type,
}

/// A reference to another validator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorRef {
    /// Instance name, or the validated type name for type-scoped validators.
    pub name: String,
    #[serde(default)]
    pub scope: DelegateScope,
    #[serde(default)]
    pub is_async: bool,
}

impl ValidatorRef {
    pub fn instance(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: DelegateScope::Instance,
            is_async: false,
        }
    }

    pub fn for_type(type_name: impl Into<String>) -> Self {
        Self {
            name: type_name.into(),
            scope: DelegateScope::Type,
            is_async: false,
        }
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

impl fmt::Display for ValidatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            DelegateScope::Instance => write!(f, "{}", self.name)?,
            DelegateScope::Type => write!(f, "type:{}", self.name)?,
        }
        if self.is_async {
            write!(f, " async")?;
        }
        Ok(())
    }
}

/// Delegates validation of a target to another validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateGroup {
    pub target: Target,
    pub validator: ValidatorRef,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
}

/// What a collection applies to each element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionBody {
    Rules(Vec<RuleNode>),
    Delegate(Box<DelegateGroup>),
}

/// An enumerable target validated per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionGroup {
    pub target: Target,
    pub body: CollectionBody,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
    #[serde(default)]
    pub leaf_rule_count: usize,
}

/// Sibling nodes evaluated against the same ambient target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeGroup {
    pub children: Vec<RuleNode>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
    #[serde(default)]
    pub leaf_rule_count: usize,
}

/// Children that only run when the condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalGroup {
    pub condition: Condition,
    pub children: Vec<RuleNode>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
    #[serde(default)]
    pub leaf_rule_count: usize,
}

/// One named alternative of an [`EitherGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub name: String,
    pub children: Vec<RuleNode>,
}

/// OR semantics: passes if any alternative produces no errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EitherGroup {
    pub target: Target,
    pub alternatives: Vec<Alternative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
    #[serde(default)]
    pub leaf_rule_count: usize,
}

/// What happens to a null value in a polymorphic group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullBehavior {
    #[default]
    Skip,
    Fail {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// What a matched type branch does.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchBehavior {
    #[default]
    Allow,
    Fail {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Delegate(ValidatorRef),
}

impl BranchBehavior {
    pub fn is_allow(&self) -> bool {
        matches!(self, BranchBehavior::Allow)
    }
}

/// One `(type, behavior)` dispatch branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeBranch {
    pub type_name: String,
    pub behavior: BranchBehavior,
}

/// Routes validation by the runtime type of the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymorphicGroup {
    pub target: Target,
    #[serde(default)]
    pub null_behavior: NullBehavior,
    pub branches: Vec<TypeBranch>,
    /// Fallback when no branch matched. `None` allows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<BranchBehavior>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
    #[serde(default)]
    pub leaf_rule_count: usize,
}

impl PolymorphicGroup {
    pub fn otherwise(&self) -> &BranchBehavior {
        const ALLOW: &BranchBehavior = &BranchBehavior::Allow;
        self.otherwise.as_ref().unwrap_or(ALLOW)
    }
}

/// Establishes a failure mode for every descendant; emits nothing itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureModeScope {
    pub mode: FailureMode,
    pub children: Vec<RuleNode>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub leaf_rule_count: usize,
}

/// One node of the validation program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleNode {
    Leaf(LeafRule),
    Target(TargetGroup),
    Delegate(DelegateGroup),
    Collection(CollectionGroup),
    Composite(CompositeGroup),
    Conditional(ConditionalGroup),
    Either(EitherGroup),
    Polymorphic(PolymorphicGroup),
    Scope(FailureModeScope),
}

impl RuleNode {
    pub fn depth(&self) -> usize {
        match self {
            RuleNode::Leaf(n) => n.depth,
            RuleNode::Target(n) => n.depth,
            RuleNode::Delegate(n) => n.depth,
            RuleNode::Collection(n) => n.depth,
            RuleNode::Composite(n) => n.depth,
            RuleNode::Conditional(n) => n.depth,
            RuleNode::Either(n) => n.depth,
            RuleNode::Polymorphic(n) => n.depth,
            RuleNode::Scope(n) => n.depth,
        }
    }

    /// The node's own failure mode; `None` inherits.
    pub fn failure_mode(&self) -> Option<FailureMode> {
        match self {
            RuleNode::Leaf(n) => n.failure_mode,
            RuleNode::Target(n) => n.failure_mode,
            RuleNode::Delegate(n) => n.failure_mode,
            RuleNode::Collection(n) => n.failure_mode,
            RuleNode::Composite(n) => n.failure_mode,
            RuleNode::Conditional(n) => n.failure_mode,
            RuleNode::Either(n) => n.failure_mode,
            RuleNode::Polymorphic(n) => n.failure_mode,
            RuleNode::Scope(n) => Some(n.mode),
        }
    }

    /// Number of leaf checks (and delegate calls) in this subtree.
    pub fn leaf_rule_count(&self) -> usize {
        match self {
            RuleNode::Leaf(_) | RuleNode::Delegate(_) => 1,
            RuleNode::Target(n) => n.leaf_rule_count,
            RuleNode::Collection(n) => n.leaf_rule_count,
            RuleNode::Composite(n) => n.leaf_rule_count,
            RuleNode::Conditional(n) => n.leaf_rule_count,
            RuleNode::Either(n) => n.leaf_rule_count,
            RuleNode::Polymorphic(n) => n.leaf_rule_count,
            RuleNode::Scope(n) => n.leaf_rule_count,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            RuleNode::Leaf(_) => "leaf",
            RuleNode::Target(_) => "target",
            RuleNode::Delegate(_) => "delegate",
            RuleNode::Collection(_) => "collection",
            RuleNode::Composite(_) => "composite",
            RuleNode::Conditional(_) => "conditional",
            RuleNode::Either(_) => "either",
            RuleNode::Polymorphic(_) => "polymorphic",
            RuleNode::Scope(_) => "scope",
        }
    }

    /// Whether anything in this subtree can record an error.
    pub fn can_fail(&self) -> bool {
        match self {
            RuleNode::Leaf(_) | RuleNode::Delegate(_) | RuleNode::Either(_) => true,
            RuleNode::Target(n) => !n.rules.is_empty(),
            RuleNode::Collection(n) => match &n.body {
                CollectionBody::Rules(children) => children.iter().any(RuleNode::can_fail),
                CollectionBody::Delegate(_) => true,
            },
            RuleNode::Composite(n) => n.children.iter().any(RuleNode::can_fail),
            RuleNode::Conditional(n) => n.children.iter().any(RuleNode::can_fail),
            RuleNode::Scope(n) => n.children.iter().any(RuleNode::can_fail),
            RuleNode::Polymorphic(n) => {
                !matches!(n.null_behavior, NullBehavior::Skip)
                    || n.branches.iter().any(|b| !b.behavior.is_allow())
                    || !n.otherwise().is_allow()
            }
        }
    }
}

/// A whole validator definition: the root of a rule tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTree {
    pub name: String,
    /// The type of the validated instance.
    pub subject: TypeRef,
    pub nodes: Vec<RuleNode>,
    /// Root failure mode; `None` takes the compiler default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
}

impl RuleTree {
    pub fn leaf_rule_count(&self) -> usize {
        self.nodes.iter().map(RuleNode::leaf_rule_count).sum()
    }
}
