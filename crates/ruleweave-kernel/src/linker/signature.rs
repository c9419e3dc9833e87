//! Signature matching between a definition and an invocation.

use std::collections::BTreeMap;

use crate::catalog::Signature;
use crate::tree::TypeRef;

/// How well a definition's signature fits an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMatch {
    /// Every position is identical.
    Full,
    /// Positions agree modulo generic parameters or nullability.
    Partial,
}

/// Generic parameter name to the concrete type it bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericBindings(BTreeMap<String, TypeRef>);

impl GenericBindings {
    pub fn get(&self, name: &str) -> Option<&TypeRef> {
        self.0.get(name)
    }

    /// Bind `name`, failing when it is already bound to another type.
    fn bind(&mut self, name: &str, ty: &TypeRef) -> bool {
        let ty = ty.without_nullability();
        match self.0.get(name) {
            Some(existing) => existing.name == ty.name,
            None => {
                self.0.insert(name.to_string(), ty);
                true
            }
        }
    }

    /// Concrete types for the given parameter positions.
    pub fn reify(&self, signature: &Signature, positions: &[usize]) -> Vec<TypeRef> {
        positions
            .iter()
            .filter_map(|&i| signature.param(i))
            .map(|p| {
                if p.ty.generic {
                    self.get(&p.ty.name).cloned().unwrap_or_else(|| p.ty.clone())
                } else {
                    p.ty.clone()
                }
            })
            .collect()
    }
}

/// Compare a definition signature against observed types, position by position.
pub fn match_signature(
    signature: &Signature,
    observed: &[TypeRef],
) -> Option<(SignatureMatch, GenericBindings)> {
    if signature.arity() != observed.len() {
        return None;
    }

    let mut kind = SignatureMatch::Full;
    let mut bindings = GenericBindings::default();

    for (param, obs) in signature.params.iter().zip(observed) {
        let declared = &param.ty;
        if declared == obs {
            continue;
        }
        kind = SignatureMatch::Partial;
        if declared.generic {
            if !obs.generic && !bindings.bind(&declared.name, obs) {
                return None;
            }
        } else if !obs.generic && declared.name != obs.name {
            return None;
        }
    }

    Some((kind, bindings))
}
