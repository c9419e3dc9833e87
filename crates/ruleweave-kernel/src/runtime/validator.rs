//! The validator trait and the compiled validator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use ruleweave_types::{ValidationError, ValidationResult, Value};

use super::machine::{run, run_async};
use super::registry::Runtime;
use super::RuntimeFault;
use crate::emit::{Instr, Procedure};

/// Anything a delegate call can reach.
///
/// Both methods return the errors found so the caller can merge them into
/// its own accumulator. `inherited_path` is the caller's rendered path and
/// prefixes every reported path.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this validator must be awaited.
    fn is_async(&self) -> bool {
        false
    }

    fn validate_to_list(
        &self,
        value: &Value,
        inherited_path: &str,
        runtime: &Runtime,
    ) -> Result<Vec<ValidationError>, RuntimeFault>;

    async fn validate_to_list_async(
        &self,
        value: &Value,
        inherited_path: &str,
        runtime: &Runtime,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ValidationError>, RuntimeFault> {
        self.validate_to_list(value, inherited_path, runtime)
    }
}

/// A compiled procedure behind the [`Validator`] trait.
///
/// Cloning is cheap; the procedure is shared and holds no run state.
#[derive(Debug, Clone)]
pub struct CompiledValidator {
    procedure: Arc<Procedure>,
    is_async: bool,
}

impl CompiledValidator {
    pub fn new(procedure: Procedure) -> Self {
        let is_async = procedure.instructions.iter().any(|instr| match instr {
            Instr::Delegate(call) => call.validator.is_async,
            _ => false,
        });
        Self {
            procedure: Arc::new(procedure),
            is_async,
        }
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    /// Validate a root value synchronously.
    pub fn validate(&self, value: &Value, runtime: &Runtime) -> Result<ValidationResult, RuntimeFault> {
        self.validate_to_list(value, "", runtime)
            .map(ValidationResult::from_errors)
    }

    /// Validate a root value, awaiting async delegates.
    pub async fn validate_async(
        &self,
        value: &Value,
        runtime: &Runtime,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult, RuntimeFault> {
        self.validate_to_list_async(value, "", runtime, cancel)
            .await
            .map(ValidationResult::from_errors)
    }
}

#[async_trait]
impl Validator for CompiledValidator {
    fn name(&self) -> &str {
        &self.procedure.name
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn validate_to_list(
        &self,
        value: &Value,
        inherited_path: &str,
        runtime: &Runtime,
    ) -> Result<Vec<ValidationError>, RuntimeFault> {
        run(&self.procedure, value, inherited_path, runtime).inspect_err(|fault| {
            warn!(validator = %self.procedure.name, %fault, "validation fault");
        })
    }

    async fn validate_to_list_async(
        &self,
        value: &Value,
        inherited_path: &str,
        runtime: &Runtime,
        cancel: &CancellationToken,
    ) -> Result<Vec<ValidationError>, RuntimeFault> {
        run_async(&self.procedure, value, inherited_path, runtime, cancel)
            .await
            .inspect_err(|fault| {
                warn!(validator = %self.procedure.name, %fault, "validation fault");
            })
    }
}
