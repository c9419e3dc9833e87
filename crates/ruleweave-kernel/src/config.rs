//! Compiler configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! default_failure_mode = "halt"
//! either_message = "Provide an email or a phone number."
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ruleweave_types::Severity;

use crate::tree::FailureMode;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings applied to every compiled procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Name of the variable holding the validated instance.
    pub root_variable: String,
    /// Failure mode of a tree root that declares none.
    pub default_failure_mode: FailureMode,
    /// Severity of errors without an override.
    pub default_severity: Severity,
    /// Message when every alternative of an either group failed.
    pub either_message: String,
    pub either_code: String,
    /// Message of the polymorphic null check.
    pub null_message: String,
    pub null_code: String,
    /// Message of a polymorphic `Fail` branch without its own message.
    pub unsupported_type_message: String,
    pub unsupported_type_code: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            root_variable: "instance".to_string(),
            default_failure_mode: FailureMode::Continue,
            default_severity: Severity::Error,
            either_message: "At least one validation group must pass.".to_string(),
            either_code: "EitherGroup".to_string(),
            null_message: "'{PropertyName}' must not be null.".to_string(),
            null_code: "NotNull".to_string(),
            unsupported_type_message: "'{PropertyName}' is not a supported type.".to_string(),
            unsupported_type_code: "UnsupportedType".to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn with_root_variable(mut self, name: impl Into<String>) -> Self {
        self.root_variable = name.into();
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.default_failure_mode = mode;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.default_severity = severity;
        self
    }

    pub fn with_either_message(mut self, message: impl Into<String>, code: impl Into<String>) -> Self {
        self.either_message = message.into();
        self.either_code = code.into();
        self
    }

    pub fn with_null_message(mut self, message: impl Into<String>, code: impl Into<String>) -> Self {
        self.null_message = message.into();
        self.null_code = code.into();
        self
    }

    pub fn with_unsupported_type_message(
        mut self,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        self.unsupported_type_message = message.into();
        self.unsupported_type_code = code.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CompilerConfig::from_toml_str(
            r#"
            default_failure_mode = "halt"
            either_code = "OneOf"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_failure_mode, FailureMode::Halt);
        assert_eq!(config.either_code, "OneOf");
        assert_eq!(config.root_variable, "instance");
        assert_eq!(config.null_code, "NotNull");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_severity = \"warning\"").unwrap();
        let config = CompilerConfig::load(file.path()).unwrap();
        assert_eq!(config.default_severity, Severity::Warning);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CompilerConfig::load("/nonexistent/ruleweave.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ruleweave.toml"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(CompilerConfig::from_toml_str("default_failure_mode = \"sometimes\"").is_err());
    }

    #[test]
    fn builder_methods() {
        let config = CompilerConfig::default()
            .with_root_variable("subject")
            .with_failure_mode(FailureMode::Halt)
            .with_either_message("pick one", "Pick");
        assert_eq!(config.root_variable, "subject");
        assert_eq!(config.either_message, "pick one");
    }
}
