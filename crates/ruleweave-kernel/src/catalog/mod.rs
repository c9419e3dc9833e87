//! Rule definition catalog.
//!
//! A [`RuleDefinition`] names a predicate, its parameter signature (the first
//! parameter is the validated value) and the default message, code and
//! placeholders copied onto a leaf rule when the linker resolves it.
//!
//! Catalog order is significant: the linker takes the first full signature
//! match, so earlier definitions win ties.

mod builtin;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tree::{ResolvedRule, TypeRef};

/// A named, typed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered parameter list; `params[0]` is the validated value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    pub fn param(&self, index: usize) -> Option<&Param> {
        self.params.get(index)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.ty)?;
        }
        write!(f, ")")
    }
}

/// Binds a `{Token}` in a message template to a parameter by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub token: String,
    pub parameter: String,
}

/// An immutable rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub signature: Signature,
    pub message: String,
    pub code: String,
    #[serde(default)]
    pub placeholders: Vec<Placeholder>,
    /// Parameter positions whose bound generic type is reified.
    #[serde(default)]
    pub generic_arguments: Vec<usize>,
    /// Runtime predicate key.
    pub predicate: String,
}

impl RuleDefinition {
    /// A definition whose code and predicate key are both `name`.
    pub fn new(name: impl Into<String>, params: Vec<Param>) -> Self {
        let name = name.into();
        Self {
            code: name.clone(),
            predicate: name.clone(),
            name,
            signature: Signature::new(params),
            message: String::new(),
            placeholders: Vec::new(),
            generic_arguments: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_placeholder(mut self, token: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.placeholders.push(Placeholder {
            token: token.into(),
            parameter: parameter.into(),
        });
        self
    }

    pub fn with_generic_argument(mut self, position: usize) -> Self {
        self.generic_arguments.push(position);
        self
    }

    pub fn with_predicate(mut self, key: impl Into<String>) -> Self {
        self.predicate = key.into();
        self
    }

    /// The resolved form of this definition with the given reified generics.
    pub fn resolve(&self, generic_arguments: Vec<TypeRef>) -> ResolvedRule {
        ResolvedRule {
            definition: self.name.clone(),
            predicate: self.predicate.clone(),
            message: self.message.clone(),
            code: self.code.clone(),
            placeholders: self.placeholders.clone(),
            generic_arguments,
        }
    }
}

impl fmt::Display for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}

/// An ordered collection of rule definitions.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    definitions: Vec<RuleDefinition>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The builtin rules.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for def in builtin::definitions() {
            catalog.register(def);
        }
        catalog
    }

    /// Append a definition. Later definitions lose full-match ties.
    pub fn register(&mut self, definition: RuleDefinition) {
        self.definitions.push(definition);
    }

    /// Definitions named `name`, in catalog order.
    pub fn candidates<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a RuleDefinition> + use<'a, 'n> {
        self.definitions.iter().filter(move |d| d.name == name)
    }

    /// First definition named `name`.
    pub fn get(&self, name: &str) -> Option<&RuleDefinition> {
        self.candidates(name).next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
