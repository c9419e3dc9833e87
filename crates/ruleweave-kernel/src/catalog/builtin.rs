//! Builtin rule definitions.
//!
//! Every builtin has a predicate of the same name in
//! [`crate::runtime::PredicateRegistry::with_builtins`].

use super::{Param, RuleDefinition};
use crate::tree::TypeRef;

fn t(name: &str) -> Param {
    Param::new(name, TypeRef::generic("T"))
}

fn string(name: &str) -> Param {
    Param::new(name, TypeRef::string())
}

fn int(name: &str) -> Param {
    Param::new(name, TypeRef::int())
}

/// A `(T, T)` comparison.
fn comparison(name: &str, relation: &str) -> RuleDefinition {
    RuleDefinition::new(name, vec![t("value"), t("comparison")])
        .with_message(format!("'{{PropertyName}}' must be {relation} '{{ComparisonValue}}'."))
        .with_placeholder("ComparisonValue", "comparison")
        .with_generic_argument(0)
}

fn between(name: &str, suffix: &str) -> RuleDefinition {
    RuleDefinition::new(name, vec![t("value"), t("from"), t("to")])
        .with_message(format!(
            "'{{PropertyName}}' must be between {{From}} and {{To}}{suffix}. You entered {{PropertyValue}}."
        ))
        .with_placeholder("From", "from")
        .with_placeholder("To", "to")
        .with_generic_argument(0)
}

pub(super) fn definitions() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition::new("NotNull", vec![t("value")])
            .with_message("'{PropertyName}' must not be null."),
        RuleDefinition::new("Null", vec![t("value")]).with_message("'{PropertyName}' must be null."),
        RuleDefinition::new("NotEmpty", vec![t("value")])
            .with_message("'{PropertyName}' must not be empty."),
        RuleDefinition::new("Empty", vec![t("value")]).with_message("'{PropertyName}' must be empty."),
        comparison("Equal", "equal to"),
        comparison("NotEqual", "not equal to")
            .with_message("'{PropertyName}' must not be equal to '{ComparisonValue}'."),
        comparison("GreaterThan", "greater than"),
        comparison("GreaterThanOrEqual", "greater than or equal to"),
        comparison("LessThan", "less than"),
        comparison("LessThanOrEqual", "less than or equal to"),
        between("InclusiveBetween", ""),
        between("ExclusiveBetween", " (exclusive)"),
        RuleDefinition::new("Length", vec![string("value"), int("min"), int("max")])
            .with_message(
                "'{PropertyName}' must be between {MinLength} and {MaxLength} characters. You entered {TotalLength} characters.",
            )
            .with_placeholder("MinLength", "min")
            .with_placeholder("MaxLength", "max"),
        RuleDefinition::new("MinimumLength", vec![string("value"), int("min")])
            .with_message(
                "The length of '{PropertyName}' must be at least {MinLength} characters. You entered {TotalLength} characters.",
            )
            .with_placeholder("MinLength", "min"),
        RuleDefinition::new("MaximumLength", vec![string("value"), int("max")])
            .with_message(
                "The length of '{PropertyName}' must be {MaxLength} characters or fewer. You entered {TotalLength} characters.",
            )
            .with_placeholder("MaxLength", "max"),
        RuleDefinition::new("ExactLength", vec![string("value"), int("length")])
            .with_message(
                "'{PropertyName}' must be {MaxLength} characters in length. You entered {TotalLength} characters.",
            )
            .with_placeholder("MaxLength", "length")
            .with_placeholder("MinLength", "length"),
        RuleDefinition::new("Matches", vec![string("value"), string("pattern")])
            .with_message("'{PropertyName}' is not in the correct format.")
            .with_placeholder("RegularExpression", "pattern"),
        RuleDefinition::new("EmailAddress", vec![string("value")])
            .with_message("'{PropertyName}' is not a valid email address."),
        RuleDefinition::new("Count", vec![t("value"), int("min"), int("max")])
            .with_message(
                "'{PropertyName}' must contain between {MinCount} and {MaxCount} items. You entered {TotalLength} items.",
            )
            .with_placeholder("MinCount", "min")
            .with_placeholder("MaxCount", "max"),
    ]
}
