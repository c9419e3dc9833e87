//! Structural invariants of a rule tree.
//!
//! The builder only produces well-formed trees, but trees can also arrive
//! as JSON from an external front-end. [`RuleTree::check_shape`] re-validates
//! every invariant before a tree is linked:
//!
//! - leaf counts equal the sum of the children's counts
//! - depth grows by exactly one inside a collection and is inherited otherwise
//! - collections, target groups and polymorphic groups are non-empty
//! - an either group has at least two non-empty alternatives

use thiserror::Error;

use super::types::*;

/// A malformed rule tree. `location` points at the offending node,
/// e.g. `nodes[2].children[0]`.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("{location}: collection group for '{target}' has no element rules")]
    EmptyCollection { location: String, target: String },

    #[error("{location}: rule chain for '{target}' has no rules")]
    EmptyTargetGroup { location: String, target: String },

    #[error("{location}: polymorphic group for '{target}' has no type branches")]
    EmptyPolymorphic { location: String, target: String },

    #[error("{location}: either group for '{target}' needs at least two non-empty alternatives, found {usable}")]
    TooFewAlternatives {
        location: String,
        target: String,
        usable: usize,
    },

    #[error("{location}: leaf rule count is {found}, children sum to {expected}")]
    LeafCountMismatch {
        location: String,
        expected: usize,
        found: usize,
    },

    #[error("{location}: depth is {found}, expected {expected}")]
    DepthMismatch {
        location: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid rule tree JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleTree {
    /// Parse a tree from JSON, recompute depths and counts, and check it.
    pub fn from_json(source: &str) -> Result<Self, TreeError> {
        let tree: RuleTree = serde_json::from_str(source)?;
        let tree = tree.renumbered();
        tree.check_shape()?;
        Ok(tree)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// A copy of this tree with every depth and leaf count recomputed.
    pub fn renumbered(mut self) -> Self {
        for node in &mut self.nodes {
            renumber(node, 0);
        }
        self
    }

    /// Check every structural invariant.
    pub fn check_shape(&self) -> Result<(), TreeError> {
        check_nodes(&self.nodes, 0, "nodes")
    }
}

/// Leaf count contributed by a polymorphic group: its delegate branches.
pub(crate) fn polymorphic_leaf_count(branches: &[TypeBranch], otherwise: &BranchBehavior) -> usize {
    branches
        .iter()
        .map(|b| &b.behavior)
        .chain(std::iter::once(otherwise))
        .filter(|b| matches!(b, BranchBehavior::Delegate(_)))
        .count()
}

pub(crate) fn sum_counts(nodes: &[RuleNode]) -> usize {
    nodes.iter().map(RuleNode::leaf_rule_count).sum()
}

fn renumber(node: &mut RuleNode, depth: usize) {
    match node {
        RuleNode::Leaf(leaf) => leaf.depth = depth,
        RuleNode::Target(group) => {
            group.depth = depth;
            for rule in &mut group.rules {
                rule.depth = depth;
            }
            group.leaf_rule_count = group.rules.len();
        }
        RuleNode::Delegate(group) => group.depth = depth,
        RuleNode::Collection(group) => {
            group.depth = depth;
            group.leaf_rule_count = match &mut group.body {
                CollectionBody::Rules(children) => {
                    for child in children.iter_mut() {
                        renumber(child, depth + 1);
                    }
                    sum_counts(children)
                }
                CollectionBody::Delegate(delegate) => {
                    delegate.depth = depth + 1;
                    1
                }
            };
        }
        RuleNode::Composite(group) => {
            group.depth = depth;
            group.leaf_rule_count = renumber_all(&mut group.children, depth);
        }
        RuleNode::Conditional(group) => {
            group.depth = depth;
            group.leaf_rule_count = renumber_all(&mut group.children, depth);
        }
        RuleNode::Scope(group) => {
            group.depth = depth;
            group.leaf_rule_count = renumber_all(&mut group.children, depth);
        }
        RuleNode::Either(group) => {
            group.depth = depth;
            group.leaf_rule_count = group
                .alternatives
                .iter_mut()
                .map(|alt| renumber_all(&mut alt.children, depth))
                .sum();
        }
        RuleNode::Polymorphic(group) => {
            group.depth = depth;
            group.leaf_rule_count = polymorphic_leaf_count(&group.branches, group.otherwise());
        }
    }
}

fn renumber_all(children: &mut [RuleNode], depth: usize) -> usize {
    for child in children.iter_mut() {
        renumber(child, depth);
    }
    sum_counts(children)
}

fn check_nodes(nodes: &[RuleNode], depth: usize, location: &str) -> Result<(), TreeError> {
    for (i, node) in nodes.iter().enumerate() {
        check_node(node, depth, &format!("{location}[{i}]"))?;
    }
    Ok(())
}

fn check_count(location: &str, expected: usize, found: usize) -> Result<(), TreeError> {
    if expected != found {
        return Err(TreeError::LeafCountMismatch {
            location: location.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

fn check_depth(location: &str, expected: usize, found: usize) -> Result<(), TreeError> {
    if expected != found {
        return Err(TreeError::DepthMismatch {
            location: location.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

fn check_node(node: &RuleNode, depth: usize, location: &str) -> Result<(), TreeError> {
    check_depth(location, depth, node.depth())?;

    match node {
        RuleNode::Leaf(_) | RuleNode::Delegate(_) => Ok(()),
        RuleNode::Target(group) => {
            if group.rules.is_empty() {
                return Err(TreeError::EmptyTargetGroup {
                    location: location.to_string(),
                    target: group.target.display_name.clone(),
                });
            }
            for (i, rule) in group.rules.iter().enumerate() {
                check_depth(&format!("{location}.rules[{i}]"), depth, rule.depth)?;
            }
            check_count(location, group.rules.len(), group.leaf_rule_count)
        }
        RuleNode::Collection(group) => match &group.body {
            CollectionBody::Rules(children) => {
                if children.is_empty() {
                    return Err(TreeError::EmptyCollection {
                        location: location.to_string(),
                        target: group.target.display_name.clone(),
                    });
                }
                check_nodes(children, depth + 1, &format!("{location}.body"))?;
                check_count(location, sum_counts(children), group.leaf_rule_count)
            }
            CollectionBody::Delegate(delegate) => {
                check_depth(&format!("{location}.body"), depth + 1, delegate.depth)?;
                check_count(location, 1, group.leaf_rule_count)
            }
        },
        RuleNode::Composite(group) => {
            let children_location = format!("{location}.children");
            check_nodes(&group.children, depth, &children_location)?;
            check_count(location, sum_counts(&group.children), group.leaf_rule_count)
        }
        RuleNode::Conditional(group) => {
            let children_location = format!("{location}.children");
            check_nodes(&group.children, depth, &children_location)?;
            check_count(location, sum_counts(&group.children), group.leaf_rule_count)
        }
        RuleNode::Scope(group) => {
            let children_location = format!("{location}.children");
            check_nodes(&group.children, depth, &children_location)?;
            check_count(location, sum_counts(&group.children), group.leaf_rule_count)
        }
        RuleNode::Either(group) => {
            let usable = group
                .alternatives
                .iter()
                .filter(|alt| !alt.children.is_empty())
                .count();
            if usable < 2 {
                return Err(TreeError::TooFewAlternatives {
                    location: location.to_string(),
                    target: group.target.display_name.clone(),
                    usable,
                });
            }
            let mut expected = 0;
            for (i, alt) in group.alternatives.iter().enumerate() {
                check_nodes(
                    &alt.children,
                    depth,
                    &format!("{location}.alternatives[{i}].children"),
                )?;
                expected += sum_counts(&alt.children);
            }
            check_count(location, expected, group.leaf_rule_count)
        }
        RuleNode::Polymorphic(group) => {
            if group.branches.is_empty() {
                return Err(TreeError::EmptyPolymorphic {
                    location: location.to_string(),
                    target: group.target.display_name.clone(),
                });
            }
            check_count(
                location,
                polymorphic_leaf_count(&group.branches, group.otherwise()),
                group.leaf_rule_count,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, depth: usize) -> LeafRule {
        LeafRule {
            target: Target::property(name, TypeRef::string()),
            rule: RuleRef::weak("NotEmpty"),
            arguments: vec![],
            overrides: Overrides::default(),
            depth,
            failure_mode: None,
        }
    }

    fn tree(nodes: Vec<RuleNode>) -> RuleTree {
        RuleTree {
            name: "T".into(),
            subject: TypeRef::named("Thing"),
            nodes,
            failure_mode: None,
        }
    }

    #[test]
    fn renumber_fixes_depth_and_counts() {
        let collection = RuleNode::Collection(CollectionGroup {
            target: Target::property("Items", TypeRef::list_of(&TypeRef::named("Item"))),
            body: CollectionBody::Rules(vec![RuleNode::Leaf(leaf("Sku", 7))]),
            depth: 3,
            failure_mode: None,
            leaf_rule_count: 0,
        });
        let t = tree(vec![collection]).renumbered();
        t.check_shape().unwrap();
        let RuleNode::Collection(c) = &t.nodes[0] else {
            panic!("expected collection");
        };
        assert_eq!(c.depth, 0);
        assert_eq!(c.leaf_rule_count, 1);
        let CollectionBody::Rules(children) = &c.body else {
            panic!("expected rules body");
        };
        assert_eq!(children[0].depth(), 1);
    }

    #[test]
    fn count_mismatch_is_reported_with_location() {
        let group = RuleNode::Composite(CompositeGroup {
            children: vec![RuleNode::Leaf(leaf("A", 0)), RuleNode::Leaf(leaf("B", 0))],
            depth: 0,
            failure_mode: None,
            leaf_rule_count: 5,
        });
        let err = tree(vec![group]).check_shape().unwrap_err();
        assert!(matches!(err, TreeError::LeafCountMismatch { expected: 2, found: 5, .. }));
        assert!(err.to_string().starts_with("nodes[0]"));
    }

    #[test]
    fn either_needs_two_usable_alternatives() {
        let group = RuleNode::Either(EitherGroup {
            target: Target::this("Contact", TypeRef::named("Contact")),
            alternatives: vec![
                Alternative {
                    name: "a".into(),
                    children: vec![RuleNode::Leaf(leaf("Email", 0))],
                },
                Alternative {
                    name: "b".into(),
                    children: vec![],
                },
            ],
            message: None,
            code: None,
            depth: 0,
            failure_mode: None,
            leaf_rule_count: 1,
        });
        let err = tree(vec![group]).check_shape().unwrap_err();
        assert!(matches!(err, TreeError::TooFewAlternatives { usable: 1, .. }));
    }

    #[test]
    fn polymorphic_without_branches_is_rejected() {
        let group = RuleNode::Polymorphic(PolymorphicGroup {
            target: Target::property("Pet", TypeRef::named("Animal")),
            null_behavior: NullBehavior::Skip,
            branches: vec![],
            otherwise: Some(BranchBehavior::Fail { message: None }),
            depth: 0,
            failure_mode: None,
            leaf_rule_count: 0,
        });
        assert!(matches!(
            tree(vec![group]).check_shape(),
            Err(TreeError::EmptyPolymorphic { .. })
        ));
    }

    #[test]
    fn from_json_renumbers() {
        let json = r#"{
            "name": "UserValidator",
            "subject": { "name": "User" },
            "nodes": [
                {
                    "kind": "target",
                    "target": { "accessor": ["Name"], "type": { "name": "string" }, "display_name": "Name", "path_segment": "Name" },
                    "rules": [
                        { "target": { "accessor": ["Name"], "type": { "name": "string" }, "display_name": "Name", "path_segment": "Name" },
                          "rule": { "weak": { "invocation": "NotEmpty" } } }
                    ]
                }
            ]
        }"#;
        let t = RuleTree::from_json(json).unwrap();
        assert_eq!(t.leaf_rule_count(), 1);
    }
}
