//! Errors raised while loading or validating configuration.

use std::path::PathBuf;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid configuration:\n{}", format_validation_errors(.0))]
    Validation(#[source] ValidationErrors),

    #[error("configuration parsing error: {0}")]
    Parsing(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Parsing(Box::new(error))
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}

/// One line per failing field, nested sections flattened with dots.
fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut lines = Vec::new();
    collect(errors, "", &mut lines);
    lines.join("\n")
}

fn collect(errors: &ValidationErrors, prefix: &str, lines: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for error in errs {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    lines.push(format!("  - {path}: {message}"));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect(nested, &path, lines),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect(nested, &format!("{path}[{index}]"), lines);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AvailsimConfig, EngineConfig};
    use validator::Validate;

    #[test]
    fn nested_errors_name_their_section() {
        let config = AvailsimConfig {
            engine: EngineConfig {
                threads: 0,
                ..EngineConfig::default()
            },
            ..AvailsimConfig::default()
        };
        let err = ConfigError::from(config.validate().unwrap_err());
        assert!(err.to_string().contains("engine.threads"));
    }
}
