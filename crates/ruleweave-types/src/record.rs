//! Validation error records: what a compiled procedure produces.
//!
//! A failing rule never raises; it appends one [`ValidationError`] to the
//! run's accumulator. The overall outcome is a [`ValidationResult`]:
//! valid when no records were collected.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Value;

/// How serious a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Error code (the rule name by default, or an override).
    pub code: String,
    /// Fully resolved message.
    pub message: String,
    pub severity: Severity,
    /// Display name of the validated target.
    pub target_name: String,
    /// Dotted/indexed path, including any inherited prefix.
    pub target_path: String,
    /// The value that failed.
    pub attempted_value: Value,
    /// Custom metadata attached to the rule.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ValidationError {
    /// Create an error-severity record without metadata.
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        target_name: impl Into<String>,
        target_path: impl Into<String>,
        attempted_value: Value,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity: Severity::Error,
            target_name: target_name.into(),
            target_path: target_path.into(),
            attempted_value,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target_path.is_empty() {
            write!(f, "[{}] {}: {}", self.severity, self.code, self.message)
        } else {
            write!(
                f,
                "[{}] {} at {}: {}",
                self.severity, self.code, self.target_path, self.message
            )
        }
    }
}

/// The outcome of validating one value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// A result with no errors.
    pub fn success() -> Self {
        Self::default()
    }

    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    /// True when no records were collected.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors whose path equals `path`.
    pub fn errors_at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.errors.iter().filter(move |e| e.target_path == path)
    }

    /// Codes in record order.
    pub fn codes(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.code.as_str()).collect()
    }
}
