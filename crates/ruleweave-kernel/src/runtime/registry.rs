//! Predicate and validator registries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ruleweave_types::Value;

use super::predicates;
use super::validator::Validator;
use crate::tree::{DelegateScope, ValidatorRef};

/// A named runtime test used by checks and guards.
///
/// `Ok(false)` is a validation failure; `Err` is a fault (bad arguments,
/// incomparable values) and aborts the run.
pub trait Predicate: Send + Sync {
    fn test(&self, value: &Value, args: &[Value]) -> Result<bool, String>;
}

/// A predicate backed by a closure.
pub struct FnPredicate<F>(pub F);

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&Value, &[Value]) -> Result<bool, String> + Send + Sync,
{
    fn test(&self, value: &Value, args: &[Value]) -> Result<bool, String> {
        (self.0)(value, args)
    }
}

/// Registry of predicates by key.
#[derive(Default, Clone)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Arc<dyn Predicate>>,
}

impl PredicateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the predicates of every builtin rule.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        predicates::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, predicate: impl Predicate + 'static) {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Value, &[Value]) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.register(name, FnPredicate(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Predicate>> {
        self.predicates.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Sorted predicate keys.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.predicates.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("predicates", &self.names())
            .finish()
    }
}

/// Validators available to delegate calls.
#[derive(Default, Clone)]
pub struct ValidatorRegistry {
    instances: HashMap<String, Arc<dyn Validator>>,
    types: HashMap<String, Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator instance under its own name.
    pub fn register_instance(&mut self, validator: Arc<dyn Validator>) {
        self.instances
            .insert(validator.name().to_string(), validator);
    }

    /// Register the validator for values of `type_name`.
    pub fn register_type(&mut self, type_name: impl Into<String>, validator: Arc<dyn Validator>) {
        self.types.insert(type_name.into(), validator);
    }

    pub fn resolve(&self, reference: &ValidatorRef) -> Option<Arc<dyn Validator>> {
        match reference.scope {
            DelegateScope::Instance => self.instances.get(&reference.name).cloned(),
            DelegateScope::Type => self.types.get(&reference.name).cloned(),
        }
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .keys()
            .cloned()
            .chain(self.types.keys().map(|t| format!("type:{t}")))
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.names())
            .finish()
    }
}

/// Everything a compiled procedure needs at validation time.
#[derive(Debug, Clone)]
pub struct Runtime {
    pub predicates: PredicateRegistry,
    pub validators: ValidatorRegistry,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Builtin predicates and no validators.
    pub fn new() -> Self {
        Self {
            predicates: PredicateRegistry::with_builtins(),
            validators: ValidatorRegistry::new(),
        }
    }

    pub fn with_predicate<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.predicates.register_fn(name, f);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.register_instance(validator);
        self
    }

    pub fn with_type_validator(mut self, type_name: impl Into<String>, validator: Arc<dyn Validator>) -> Self {
        self.validators.register_type(type_name, validator);
        self
    }
}
