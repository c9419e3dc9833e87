//! Builtin predicates backing the builtin catalog.
//!
//! Null passes every rule except `NotNull`, `NotEmpty` and `Equal`; a rule
//! that wants a value present is paired with `NotNull`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;

use ruleweave_types::Value;

use super::registry::{Predicate, PredicateRegistry};

fn arg<'a>(args: &'a [Value], index: usize) -> Result<&'a Value, String> {
    args.get(index)
        .ok_or_else(|| format!("missing argument {}", index + 1))
}

fn int_arg(args: &[Value], index: usize) -> Result<i64, String> {
    let value = arg(args, index)?;
    value
        .as_i64()
        .ok_or_else(|| format!("argument {} must be an int, got {}", index + 1, value.type_name()))
}

fn compare(value: &Value, other: &Value) -> Result<Ordering, String> {
    value
        .compare(other)
        .ok_or_else(|| format!("cannot compare {} with {}", value.type_name(), other.type_name()))
}

fn length(value: &Value) -> Result<i64, String> {
    value
        .len()
        .map(|n| n as i64)
        .ok_or_else(|| format!("{} has no length", value.type_name()))
}

/// `min <= n <= max`; a negative `max` means unbounded.
fn within(n: i64, min: i64, max: i64) -> bool {
    n >= min && (max < 0 || n <= max)
}

/// An ordering test against the first argument.
fn ordering(registry: &mut PredicateRegistry, name: &str, accept: fn(Ordering) -> bool) {
    registry.register_fn(name, move |value, args| {
        if value.is_null() {
            return Ok(true);
        }
        Ok(accept(compare(value, arg(args, 0)?)?))
    });
}

/// Most compiled patterns `Matches` keeps at once.
const REGEX_CACHE_LIMIT: usize = 64;

/// Regex matching with compiled patterns cached by source.
///
/// The cache is dropped whole once it reaches [`REGEX_CACHE_LIMIT`].
#[derive(Default)]
struct Matches {
    cache: Mutex<HashMap<String, Regex>>,
}

impl Predicate for Matches {
    fn test(&self, value: &Value, args: &[Value]) -> Result<bool, String> {
        if value.is_null() {
            return Ok(true);
        }
        let pattern = arg(args, 0)?
            .as_str()
            .ok_or_else(|| "pattern must be a string".to_string())?;
        let text = value
            .as_str()
            .ok_or_else(|| format!("cannot match a {}", value.type_name()))?;

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| "regex cache poisoned".to_string())?;
        if let Some(re) = cache.get(pattern) {
            return Ok(re.is_match(text));
        }
        let regex = Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
        let matched = regex.is_match(text);
        if cache.len() >= REGEX_CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(pattern.to_string(), regex);
        Ok(matched)
    }
}

/// Register every builtin predicate.
pub(super) fn register(registry: &mut PredicateRegistry) {
    registry.register_fn("NotNull", |value, _| Ok(!value.is_null()));
    registry.register_fn("Null", |value, _| Ok(value.is_null()));
    registry.register_fn("NotEmpty", |value, _| Ok(!value.is_empty_value()));
    registry.register_fn("Empty", |value, _| Ok(value.is_empty_value()));
    registry.register_fn("Equal", |value, args| Ok(value.loosely_equals(arg(args, 0)?)));
    registry.register_fn("NotEqual", |value, args| {
        Ok(value.is_null() || !value.loosely_equals(arg(args, 0)?))
    });

    ordering(registry, "GreaterThan", |o| o == Ordering::Greater);
    ordering(registry, "GreaterThanOrEqual", |o| o != Ordering::Less);
    ordering(registry, "LessThan", |o| o == Ordering::Less);
    ordering(registry, "LessThanOrEqual", |o| o != Ordering::Greater);

    registry.register_fn("InclusiveBetween", |value, args| {
        if value.is_null() {
            return Ok(true);
        }
        Ok(compare(value, arg(args, 0)?)? != Ordering::Less
            && compare(value, arg(args, 1)?)? != Ordering::Greater)
    });
    registry.register_fn("ExclusiveBetween", |value, args| {
        if value.is_null() {
            return Ok(true);
        }
        Ok(compare(value, arg(args, 0)?)? == Ordering::Greater
            && compare(value, arg(args, 1)?)? == Ordering::Less)
    });

    registry.register_fn("Length", |value, args| {
        if value.is_null() {
            return Ok(true);
        }
        Ok(within(length(value)?, int_arg(args, 0)?, int_arg(args, 1)?))
    });
    registry.register_fn("MinimumLength", |value, args| {
        if value.is_null() {
            return Ok(true);
        }
        Ok(length(value)? >= int_arg(args, 0)?)
    });
    registry.register_fn("MaximumLength", |value, args| {
        if value.is_null() {
            return Ok(true);
        }
        Ok(length(value)? <= int_arg(args, 0)?)
    });
    registry.register_fn("ExactLength", |value, args| {
        if value.is_null() {
            return Ok(true);
        }
        Ok(length(value)? == int_arg(args, 0)?)
    });
    registry.register_fn("Count", |value, args| {
        if value.is_null() {
            return Ok(true);
        }
        let items = value
            .as_list()
            .ok_or_else(|| format!("cannot count a {}", value.type_name()))?;
        Ok(within(items.len() as i64, int_arg(args, 0)?, int_arg(args, 1)?))
    });

    registry.register("Matches", Matches::default());
    registry.register_fn("EmailAddress", |value, _| {
        let Some(text) = value.as_str() else {
            return Ok(value.is_null());
        };
        // one '@', neither first nor last
        Ok(match (text.find('@'), text.rfind('@')) {
            (Some(first), Some(last)) => first == last && first > 0 && last < text.len() - 1,
            _ => false,
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn run(name: &str, value: Value, args: Vec<Value>) -> Result<bool, String> {
        let registry = PredicateRegistry::with_builtins();
        registry.get(name).unwrap().test(&value, &args)
    }

    #[rstest]
    #[case("NotNull", Value::Null, vec![], false)]
    #[case("NotEmpty", Value::from("  "), vec![], false)]
    #[case("NotEmpty", Value::Null, vec![], false)]
    #[case("Empty", Value::Null, vec![], true)]
    #[case("Equal", Value::Null, vec![Value::Int(1)], false)]
    #[case("Equal", Value::Int(1), vec![Value::Float(1.0)], true)]
    #[case("NotEqual", Value::Null, vec![Value::Int(1)], true)]
    #[case("GreaterThan", Value::Int(18), vec![Value::Int(17)], true)]
    #[case("GreaterThan", Value::Int(17), vec![Value::Int(17)], false)]
    #[case("GreaterThan", Value::Null, vec![Value::Int(17)], true)]
    #[case("LessThanOrEqual", Value::Float(2.5), vec![Value::Int(3)], true)]
    #[case("InclusiveBetween", Value::Int(10), vec![Value::Int(1), Value::Int(10)], true)]
    #[case("ExclusiveBetween", Value::Int(10), vec![Value::Int(1), Value::Int(10)], false)]
    #[case("Length", Value::from("abc"), vec![Value::Int(1), Value::Int(2)], false)]
    #[case("Length", Value::from("abc"), vec![Value::Int(1), Value::Int(-1)], true)]
    #[case("MinimumLength", Value::from("héllo"), vec![Value::Int(5)], true)]
    #[case("MaximumLength", Value::from("abc"), vec![Value::Int(2)], false)]
    #[case("ExactLength", Value::from("ab"), vec![Value::Int(2)], true)]
    #[case("Matches", Value::from("ab-12"), vec![Value::from(r"^[a-z]+-\d+$")], true)]
    #[case("Matches", Value::from("12"), vec![Value::from(r"^[a-z]+$")], false)]
    #[case("EmailAddress", Value::from("a@b.io"), vec![], true)]
    #[case("EmailAddress", Value::from("@b.io"), vec![], false)]
    #[case("EmailAddress", Value::from("a@b@c"), vec![], false)]
    #[case("EmailAddress", Value::Null, vec![], true)]
    #[case("Count", Value::from(vec![1, 2, 3]), vec![Value::Int(1), Value::Int(2)], false)]
    fn builtin(
        #[case] name: &str,
        #[case] value: Value,
        #[case] args: Vec<Value>,
        #[case] expected: bool,
    ) {
        assert_eq!(run(name, value, args), Ok(expected));
    }

    #[test]
    fn incomparable_values_fault() {
        let err = run("GreaterThan", Value::from("a"), vec![Value::Int(1)]).unwrap_err();
        assert!(err.contains("cannot compare string with int"));
    }

    #[test]
    fn invalid_pattern_faults() {
        assert!(run("Matches", Value::from("a"), vec![Value::from("(")]).is_err());
    }

    #[test]
    fn pattern_cache_stays_bounded() {
        let matches = Matches::default();
        for i in 0..REGEX_CACHE_LIMIT * 3 {
            let pattern = Value::from(format!("^a{{{i}}}$"));
            assert_eq!(matches.test(&Value::from("a".repeat(i)), &[pattern]), Ok(true));
            assert!(matches.cache.lock().unwrap().len() <= REGEX_CACHE_LIMIT);
        }
        let pattern = Value::from("^b+$");
        assert_eq!(matches.test(&Value::from("bbb"), &[pattern.clone()]), Ok(true));
        assert_eq!(matches.test(&Value::from("abc"), &[pattern]), Ok(false));
    }
}
