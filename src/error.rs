//! Typed errors surfaced to the operator. Everything else travels as
//! `anyhow::Error` with context attached at the failure site.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} is required")]
pub struct ValidationError {
    pub field: &'static str,
}

/// Every field problem found in one submission, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|error| error.field).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "invalid video: {joined}")
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a regeneration is already running")]
    Busy,
    #[error("unknown video id: {0}")]
    UnknownVideo(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_join_per_field_messages() {
        let errors = ValidationErrors(vec![
            ValidationError { field: "title" },
            ValidationError { field: "embed" },
        ]);
        assert_eq!(errors.fields(), vec!["title", "embed"]);
        assert_eq!(
            errors.to_string(),
            "invalid video: title is required; embed is required"
        );
    }
}
