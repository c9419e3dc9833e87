//! Rule linking: resolve weak rule invocations against the catalog.
//!
//! A weak leaf rule carries only an invocation name and its observed
//! argument types (target type first). The linker picks a definition by
//! signature: the first full match in catalog order wins, otherwise the
//! last partial match seen. The winning definition's message, code and
//! placeholders are copied onto the rule and its arguments are renamed to
//! the definition's parameter names.
//!
//! Linking never mutates its input. When any invocation cannot be resolved
//! the original tree is returned with every diagnostic.

mod signature;

pub use signature::{match_signature, GenericBindings, SignatureMatch};

use thiserror::Error;
use tracing::{debug, trace};

use crate::catalog::{Catalog, RuleDefinition};
use crate::tree::*;

/// An invocation no catalog definition accepts.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: cannot resolve rule '{invocation}{observed}' for '{target}'{}", candidates_note(.candidates))]
pub struct LinkDiagnostic {
    /// Node location, e.g. `nodes[1].rules[0]`.
    pub location: String,
    pub invocation: String,
    /// Observed signature, target type first.
    pub observed: String,
    pub target: String,
    /// Signatures of definitions sharing the name.
    pub candidates: Vec<String>,
}

fn candidates_note(candidates: &[String]) -> String {
    if candidates.is_empty() {
        " (no rule with that name)".to_string()
    } else {
        format!(" (candidates: {})", candidates.join(", "))
    }
}

/// The winning definition for one invocation.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub definition: &'a RuleDefinition,
    pub kind: SignatureMatch,
    pub generic_arguments: Vec<TypeRef>,
}

/// Result of linking a tree.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    /// The linked tree, or the input unchanged when diagnostics exist.
    pub tree: RuleTree,
    pub diagnostics: Vec<LinkDiagnostic>,
}

impl LinkOutcome {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_result(self) -> Result<RuleTree, Vec<LinkDiagnostic>> {
        if self.diagnostics.is_empty() {
            Ok(self.tree)
        } else {
            Err(self.diagnostics)
        }
    }
}

/// Resolves weak rule references against a catalog.
pub struct Linker<'a> {
    catalog: &'a Catalog,
}

impl<'a> Linker<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Pick a definition for `name` called with `observed` types.
    pub fn resolve(&self, name: &str, observed: &[TypeRef]) -> Option<Resolution<'a>> {
        let mut partial = None;
        for definition in self.catalog.candidates(name) {
            match match_signature(&definition.signature, observed) {
                Some((SignatureMatch::Full, bindings)) => {
                    return Some(Resolution {
                        definition,
                        kind: SignatureMatch::Full,
                        generic_arguments: bindings
                            .reify(&definition.signature, &definition.generic_arguments),
                    });
                }
                Some((SignatureMatch::Partial, bindings)) => {
                    partial = Some((definition, bindings));
                }
                None => {}
            }
        }
        partial.map(|(definition, bindings)| Resolution {
            definition,
            kind: SignatureMatch::Partial,
            generic_arguments: bindings.reify(&definition.signature, &definition.generic_arguments),
        })
    }

    /// Link every weak rule in `tree`.
    pub fn link(&self, tree: &RuleTree) -> LinkOutcome {
        let mut diagnostics = Vec::new();
        let nodes = self.link_nodes(&tree.nodes, "nodes", &mut diagnostics);

        if !diagnostics.is_empty() {
            debug!(tree = %tree.name, count = diagnostics.len(), "linking failed");
            return LinkOutcome {
                tree: tree.clone(),
                diagnostics,
            };
        }

        debug!(tree = %tree.name, "linked");
        LinkOutcome {
            tree: RuleTree {
                name: tree.name.clone(),
                subject: tree.subject.clone(),
                nodes,
                failure_mode: tree.failure_mode,
            },
            diagnostics,
        }
    }

    fn link_nodes(
        &self,
        nodes: &[RuleNode],
        location: &str,
        diagnostics: &mut Vec<LinkDiagnostic>,
    ) -> Vec<RuleNode> {
        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| self.link_node(node, &format!("{location}[{i}]"), diagnostics))
            .collect()
    }

    fn link_node(
        &self,
        node: &RuleNode,
        location: &str,
        diagnostics: &mut Vec<LinkDiagnostic>,
    ) -> RuleNode {
        match node {
            RuleNode::Leaf(leaf) => RuleNode::Leaf(self.link_leaf(leaf, location, diagnostics)),
            RuleNode::Target(group) => {
                let rules = group
                    .rules
                    .iter()
                    .enumerate()
                    .map(|(i, rule)| {
                        self.link_leaf(rule, &format!("{location}.rules[{i}]"), diagnostics)
                    })
                    .collect();
                RuleNode::Target(TargetGroup {
                    rules,
                    ..group.clone()
                })
            }
            RuleNode::Delegate(_) | RuleNode::Polymorphic(_) => node.clone(),
            RuleNode::Collection(group) => {
                let body = match &group.body {
                    CollectionBody::Rules(children) => CollectionBody::Rules(self.link_nodes(
                        children,
                        &format!("{location}.body"),
                        diagnostics,
                    )),
                    CollectionBody::Delegate(d) => CollectionBody::Delegate(d.clone()),
                };
                RuleNode::Collection(CollectionGroup {
                    body,
                    ..group.clone()
                })
            }
            RuleNode::Composite(group) => RuleNode::Composite(CompositeGroup {
                children: self.link_nodes(&group.children, &format!("{location}.children"), diagnostics),
                ..group.clone()
            }),
            RuleNode::Conditional(group) => RuleNode::Conditional(ConditionalGroup {
                children: self.link_nodes(&group.children, &format!("{location}.children"), diagnostics),
                ..group.clone()
            }),
            RuleNode::Scope(group) => RuleNode::Scope(FailureModeScope {
                children: self.link_nodes(&group.children, &format!("{location}.children"), diagnostics),
                ..group.clone()
            }),
            RuleNode::Either(group) => {
                let alternatives = group
                    .alternatives
                    .iter()
                    .enumerate()
                    .map(|(i, alt)| Alternative {
                        name: alt.name.clone(),
                        children: self.link_nodes(
                            &alt.children,
                            &format!("{location}.alternatives[{i}].children"),
                            diagnostics,
                        ),
                    })
                    .collect();
                RuleNode::Either(EitherGroup {
                    alternatives,
                    ..group.clone()
                })
            }
        }
    }

    fn link_leaf(
        &self,
        leaf: &LeafRule,
        location: &str,
        diagnostics: &mut Vec<LinkDiagnostic>,
    ) -> LeafRule {
        let RuleRef::Weak { invocation } = &leaf.rule else {
            return leaf.clone();
        };

        let observed = leaf.observed_signature();
        let Some(resolution) = self.resolve(invocation, &observed) else {
            diagnostics.push(LinkDiagnostic {
                location: location.to_string(),
                invocation: invocation.clone(),
                observed: render_types(&observed),
                target: leaf.target.display_name.clone(),
                candidates: self
                    .catalog
                    .candidates(invocation)
                    .map(ToString::to_string)
                    .collect(),
            });
            return leaf.clone();
        };

        trace!(
            location,
            invocation = %invocation,
            definition = %resolution.definition,
            kind = ?resolution.kind,
            "resolved rule"
        );

        let params = &resolution.definition.signature.params;
        let arguments = leaf
            .arguments
            .iter()
            .zip(params.iter().skip(1))
            .map(|(arg, param)| Argument {
                name: param.name.clone(),
                ..arg.clone()
            })
            .collect();

        LeafRule {
            rule: RuleRef::Resolved(resolution.definition.resolve(resolution.generic_arguments)),
            arguments,
            ..leaf.clone()
        }
    }
}

fn render_types(types: &[TypeRef]) -> String {
    let parts: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Param;
    use crate::tree::builder::{NodeBuilder, TreeBuilder};

    fn name() -> Target {
        Target::property("Name", TypeRef::string())
    }

    #[test]
    fn resolution_outlives_the_invocation_name() {
        let catalog = Catalog::builtin();
        let linker = Linker::new(&catalog);
        let resolution = {
            let invocation = String::from("NotEmpty");
            linker.resolve(&invocation, &[TypeRef::string()])
        };
        let resolution = resolution.unwrap();
        assert_eq!(resolution.definition.name, "NotEmpty");
        assert_eq!(resolution.kind, SignatureMatch::Full);
    }

    #[test]
    fn first_full_match_wins() {
        let mut catalog = Catalog::new();
        catalog.register(
            RuleDefinition::new("Max", vec![Param::new("v", TypeRef::generic("T")), Param::new("m", TypeRef::generic("T"))])
                .with_code("generic"),
        );
        catalog.register(
            RuleDefinition::new("Max", vec![Param::new("v", TypeRef::int()), Param::new("m", TypeRef::int())])
                .with_code("first_full"),
        );
        catalog.register(
            RuleDefinition::new("Max", vec![Param::new("v", TypeRef::int()), Param::new("m", TypeRef::int())])
                .with_code("second_full"),
        );
        let linker = Linker::new(&catalog);
        let r = linker.resolve("Max", &[TypeRef::int(), TypeRef::int()]).unwrap();
        assert_eq!(r.kind, SignatureMatch::Full);
        assert_eq!(r.definition.code, "first_full");
    }

    #[test]
    fn last_partial_match_is_kept() {
        let mut catalog = Catalog::new();
        for code in ["a", "b"] {
            catalog.register(
                RuleDefinition::new("R", vec![Param::new("v", TypeRef::generic("T"))]).with_code(code),
            );
        }
        let linker = Linker::new(&catalog);
        let r = linker.resolve("R", &[TypeRef::string()]).unwrap();
        assert_eq!(r.kind, SignatureMatch::Partial);
        assert_eq!(r.definition.code, "b");
    }

    #[test]
    fn link_copies_definition_and_renames_arguments() {
        let catalog = Catalog::builtin();
        let tree = TreeBuilder::new("V", TypeRef::named("User"))
            .rule_for(name(), |r| r.rule("Length", [Argument::literal(2), Argument::literal(10)]))
            .build()
            .unwrap();
        let outcome = Linker::new(&catalog).link(&tree);
        assert!(outcome.is_ok());
        let RuleNode::Target(group) = &outcome.tree.nodes[0] else {
            panic!("expected target group");
        };
        let rule = &group.rules[0];
        let RuleRef::Resolved(resolved) = &rule.rule else {
            panic!("expected resolved rule");
        };
        assert_eq!(resolved.code, "Length");
        assert_eq!(resolved.placeholders.len(), 2);
        let names: Vec<_> = rule.arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["min", "max"]);
    }

    #[test]
    fn failure_returns_original_tree_with_all_diagnostics() {
        let catalog = Catalog::builtin();
        let tree = TreeBuilder::new("V", TypeRef::named("User"))
            .rule_for(name(), |r| r.check("NotEmpty").check("Bogus"))
            .rule_for(Target::property("Age", TypeRef::int()), |r| r.check("EmailAddress"))
            .build()
            .unwrap();
        let outcome = Linker::new(&catalog).link(&tree);
        assert_eq!(outcome.tree, tree);
        assert_eq!(outcome.diagnostics.len(), 2);
        assert_eq!(outcome.diagnostics[0].location, "nodes[0].rules[1]");
        assert!(outcome.diagnostics[0].to_string().contains("no rule with that name"));
        assert_eq!(outcome.diagnostics[1].observed, "(int)");
        assert_eq!(outcome.diagnostics[1].candidates, vec!["EmailAddress(string)".to_string()]);
    }

    #[test]
    fn generic_arguments_are_reified() {
        let catalog = Catalog::builtin();
        let tree = TreeBuilder::new("V", TypeRef::named("User"))
            .rule_for(Target::property("Age", TypeRef::int()), |r| {
                r.rule("GreaterThan", [Argument::literal(17)])
            })
            .build()
            .unwrap();
        let linked = Linker::new(&catalog).link(&tree).into_result().unwrap();
        let RuleNode::Target(group) = &linked.nodes[0] else {
            panic!("expected target group");
        };
        let RuleRef::Resolved(resolved) = &group.rules[0].rule else {
            panic!("expected resolved rule");
        };
        assert_eq!(resolved.generic_arguments, vec![TypeRef::int()]);
    }
}
