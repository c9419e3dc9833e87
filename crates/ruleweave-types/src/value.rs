//! Runtime values.
//!
//! A [`Value`] is the graph a compiled validation procedure walks. Objects
//! carry their runtime type name (and the names of the types they derive
//! from) so polymorphic dispatch can match on them.
//!
//! The JSON form is plain JSON; objects may carry two reserved keys:
//!
//! ```json
//! { "$type": "Dog", "$bases": ["Animal"], "name": "Rex" }
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved JSON key naming an object's runtime type.
pub const TYPE_KEY: &str = "$type";
/// Reserved JSON key listing an object's base types.
pub const BASES_KEY: &str = "$bases";

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(Object),
}

/// A typed object: runtime type name, base type names, and fields in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub type_name: String,
    pub bases: Vec<String>,
    pub fields: Vec<(String, Value)>,
}

impl Object {
    /// Create an empty object of the given runtime type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            bases: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Add a base type name.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    /// Add or replace a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing an existing one with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Whether this object is of `ty` or derives from it.
    pub fn is_instance_of(&self, ty: &str) -> bool {
        self.type_name == ty || self.bases.iter().any(|b| b == ty)
    }
}

impl Value {
    /// Runtime type name of this value.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Object(o) => &o.type_name,
        }
    }

    /// Whether the value matches a type name.
    ///
    /// Objects match their own type, any base type, and `object`.
    /// Ints also match `float` so numeric dispatch can widen.
    pub fn is_instance_of(&self, ty: &str) -> bool {
        match self {
            Value::Null => false,
            Value::Object(o) => ty == "object" || o.is_instance_of(ty),
            Value::Int(_) => ty == "int" || ty == "float",
            other => other.type_name() == ty,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness for runtime guards: `null` and `false` are false,
    /// numbers are true when non-zero, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            _ => true,
        }
    }

    /// Emptiness as `NotEmpty` sees it: null, blank strings, empty lists,
    /// and objects without fields.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Object(o) => o.fields.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Length in characters (strings) or elements (lists).
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Read a field of an object value. Non-objects have no fields.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(o) => o.get(name),
            _ => None,
        }
    }

    /// Compare two values of compatible kinds.
    ///
    /// Numbers compare across int/float; strings and bools compare with
    /// themselves. Anything else is unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Equality with numeric widening (`1 == 1.0`).
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
                self.compare(other) == Some(Ordering::Equal)
            }
            _ => self == other,
        }
    }

    /// Convert from JSON, honoring the reserved `$type` / `$bases` keys.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => {
                let type_name = map
                    .get(TYPE_KEY)
                    .and_then(Json::as_str)
                    .unwrap_or("object")
                    .to_string();
                let bases = map
                    .get(BASES_KEY)
                    .and_then(Json::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(Json::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let fields = map
                    .iter()
                    .filter(|(k, _)| k.as_str() != TYPE_KEY && k.as_str() != BASES_KEY)
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect();
                Value::Object(Object {
                    type_name,
                    bases,
                    fields,
                })
            }
        }
    }

    /// Convert to JSON. Typed objects emit `$type` (and `$bases` when present).
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(o) => {
                let mut map = serde_json::Map::new();
                if o.type_name != "object" {
                    map.insert(TYPE_KEY.to_string(), Json::String(o.type_name.clone()));
                }
                if !o.bases.is_empty() {
                    map.insert(
                        BASES_KEY.to_string(),
                        Json::Array(o.bases.iter().cloned().map(Json::String).collect()),
                    );
                }
                for (k, v) in &o.fields {
                    map.insert(k.clone(), v.to_json());
                }
                Json::Object(map)
            }
        }
    }
}

impl fmt::Display for Value {
    /// Message rendering: strings are unquoted and null renders empty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(o) => write!(f, "{}", o.type_name),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn json_objects_carry_type_information() {
        let v = Value::from_json(&json!({
            "$type": "Dog",
            "$bases": ["Animal"],
            "name": "Rex"
        }));
        assert_eq!(v.type_name(), "Dog");
        assert!(v.is_instance_of("Dog"));
        assert!(v.is_instance_of("Animal"));
        assert!(v.is_instance_of("object"));
        assert!(!v.is_instance_of("Cat"));
        assert_eq!(v.field("name"), Some(&Value::from("Rex")));
        assert_eq!(v.field("$type"), None);
    }

    #[test]
    fn untyped_objects_are_object() {
        let v = Value::from_json(&json!({"a": 1}));
        assert_eq!(v.type_name(), "object");
        assert_eq!(v.to_json(), json!({"a": 1}));
    }

    #[test]
    fn json_numbers_prefer_int() {
        assert_eq!(Value::from_json(&json!(3)), Value::Int(3));
        assert_eq!(Value::from_json(&json!(3.5)), Value::Float(3.5));
    }

    #[test]
    fn serde_uses_plain_json() {
        let v: Value = serde_json::from_str(r#"{"$type":"Point","x":1}"#).unwrap();
        assert_eq!(v.type_name(), "Point");
        let back = serde_json::to_value(&v).unwrap();
        assert_eq!(back, json!({"$type": "Point", "x": 1}));
    }

    #[rstest]
    #[case::null(Value::Null, true)]
    #[case::blank(Value::from("   "), true)]
    #[case::text(Value::from("x"), false)]
    #[case::empty_list(Value::List(vec![]), true)]
    #[case::zero(Value::Int(0), false)]
    fn emptiness(#[case] value: Value, #[case] empty: bool) {
        assert_eq!(value.is_empty_value(), empty);
    }

    #[test]
    fn numeric_compare_widens() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert!(Value::Int(1).loosely_equals(&Value::Float(1.0)));
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn display_for_messages() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert_eq!(Value::from(vec![1, 2]).to_string(), "[1, 2]");
    }
}
