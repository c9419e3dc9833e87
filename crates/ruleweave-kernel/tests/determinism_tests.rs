//! Linking is idempotent and compilation is deterministic.

use proptest::prelude::*;

use ruleweave_kernel::prelude::*;
use ruleweave_kernel::tree::builder::RuleChain;

#[derive(Debug, Clone)]
enum Shape {
    Chain { field: usize, rules: Vec<usize>, halt: bool },
    Each { field: usize, rules: Vec<usize> },
    Either { left: usize, right: usize },
    Scope { halt: bool, inner: Vec<usize> },
}

const FIELDS: &[&str] = &["Name", "Email", "Nick"];
const RULES: &[&str] = &["NotNull", "NotEmpty", "EmailAddress", "Empty"];

fn target(field: usize) -> Target {
    Target::property(FIELDS[field % FIELDS.len()], TypeRef::string())
}

fn chain(r: RuleChain, rules: &[usize]) -> RuleChain {
    rules
        .iter()
        .fold(r, |r, &i| r.check(RULES[i % RULES.len()]))
}

fn shape() -> impl Strategy<Value = Shape> {
    let rules = prop::collection::vec(0..RULES.len(), 1..4);
    prop_oneof![
        (0..FIELDS.len(), rules.clone(), any::<bool>())
            .prop_map(|(field, rules, halt)| Shape::Chain { field, rules, halt }),
        (0..FIELDS.len(), rules.clone()).prop_map(|(field, rules)| Shape::Each { field, rules }),
        (0..FIELDS.len(), 0..FIELDS.len()).prop_map(|(left, right)| Shape::Either { left, right }),
        (any::<bool>(), rules).prop_map(|(halt, inner)| Shape::Scope { halt, inner }),
    ]
}

fn add<B: NodeBuilder>(builder: B, shape: &Shape) -> B {
    match shape {
        Shape::Chain { field, rules, halt } => builder.rule_for(target(*field), |r| {
            let r = chain(r, rules);
            if *halt { r.halt() } else { r }
        }),
        Shape::Each { field, rules } => builder.each(
            Target::property(FIELDS[field % FIELDS.len()], TypeRef::list_of(&TypeRef::string())),
            |r| chain(r, rules),
        ),
        Shape::Either { left, right } => {
            builder.either(Target::this("Subject", TypeRef::named("Subject")), |e| {
                e.alternative("left", |b| b.rule_for(target(*left), |r| r.check("NotEmpty")))
                    .alternative("right", |b| b.rule_for(target(*right), |r| r.check("NotEmpty")))
            })
        }
        Shape::Scope { halt, inner } => {
            let mode = if *halt { FailureMode::Halt } else { FailureMode::Continue };
            builder.scope(mode, |b| b.rule_for(target(0), |r| chain(r, inner)))
        }
    }
}

fn build(shapes: &[Shape], halt: bool) -> RuleTree {
    let mut builder = TreeBuilder::new("SubjectValidator", TypeRef::named("Subject"));
    if halt {
        builder = builder.halt();
    }
    shapes
        .iter()
        .fold(builder, add)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn linking_twice_is_idempotent(shapes in prop::collection::vec(shape(), 1..6), halt in any::<bool>()) {
        let compiler = Compiler::with_builtins();
        let tree = build(&shapes, halt);
        let once = compiler.link(&tree).into_result().unwrap();
        let twice = compiler.link(&once).into_result().unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn compiling_twice_is_byte_identical(shapes in prop::collection::vec(shape(), 1..6), halt in any::<bool>()) {
        let compiler = Compiler::with_builtins();
        let tree = build(&shapes, halt);
        let first = compiler.compile_procedure(&tree).unwrap();
        let second = compiler.compile_procedure(&tree).unwrap();
        prop_assert_eq!(first.to_string(), second.to_string());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn every_jump_lands_on_a_label(shapes in prop::collection::vec(shape(), 1..6), halt in any::<bool>()) {
        let procedure = Compiler::with_builtins().compile_procedure(&build(&shapes, halt)).unwrap();
        for target in procedure.jump_targets() {
            prop_assert!(procedure.label(target).is_some(), "missing label {}", target);
        }
    }
}

#[test]
fn tree_json_round_trips_through_the_compiler() {
    let tree = build(
        &[
            Shape::Chain { field: 0, rules: vec![0, 1], halt: true },
            Shape::Either { left: 1, right: 2 },
        ],
        false,
    );
    let json = tree.to_json().unwrap();
    let parsed = RuleTree::from_json(&json).unwrap();
    assert_eq!(parsed, tree);

    let compiler = Compiler::with_builtins();
    assert_eq!(
        compiler.compile_procedure(&parsed).unwrap(),
        compiler.compile_procedure(&tree).unwrap()
    );
}
