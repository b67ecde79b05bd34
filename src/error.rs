use thiserror::Error;

/// Errors surfaced by the mutation engine's public API.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("class not found: {class}")]
    ClassNotFound { class: String },

    #[error("invalid class {class}: {reason}")]
    InvalidClass { class: String, reason: String },

    #[error("mutation not applicable to {class}: {reason}")]
    MutationNotApplicable { class: String, reason: String },

    /// An operator panicked or failed while visiting an instruction.
    #[error("operator {operator} failed at {location} ordinal {ordinal}: {reason}")]
    OperatorInternalError {
        operator: String,
        location: String,
        ordinal: usize,
        reason: String,
    },

    #[error("unknown filter: {0}")]
    FilterConfigError(String),

    #[error("unknown mutation operator or group: {0}")]
    UnknownOperator(String),

    #[error("invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to read {class} from class source: {reason}")]
    Source { class: String, reason: String },
}

impl MutationError {
    pub(crate) fn invalid_class(class: &str, err: &anyhow::Error) -> Self {
        MutationError::InvalidClass {
            class: class.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn not_applicable(class: &str, reason: impl Into<String>) -> Self {
        MutationError::MutationNotApplicable {
            class: class.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_pattern(pattern: &str, err: &regex::Error) -> Self {
        MutationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T, E = MutationError> = std::result::Result<T, E>;
