//! Error types for the stageq crate

use thiserror::Error;

use crate::variables::VarRef;

/// Main error type for the stageq crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("variable '{name}' has an empty domain")]
    EmptyDomain { name: String },

    #[error("variable '{name}' is assigned to stage {stage}, expected a stage below {stages}")]
    InvalidStage {
        name: String,
        stage: usize,
        stages: usize,
    },

    #[error("variable name '{name}' is declared more than once")]
    DuplicateVariable { name: String },

    #[error("distribution for '{name}' does not fit its domain: {reason}")]
    InvalidDistribution { name: String, reason: String },

    #[error("unknown variable '{name}' referenced by {context}")]
    UnknownVariable { name: String, context: String },

    #[error("subset {subset:?} is not a subset of the {arity} indexed variables")]
    InvalidSubset { subset: Vec<usize>, arity: usize },

    #[error("combination {combo:?} is not present in the index")]
    CombinationNotFound { combo: Vec<usize> },

    #[error("variable {var} has no value when evaluating constraint '{constraint}'")]
    UnassignedVariable { var: VarRef, constraint: String },

    #[error("{what} index {index} is out of bounds (len {len})")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("progress bar template error: {message}")]
    ProgressBarTemplate { message: String },
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            operation: "IO operation".to_string(),
            source,
        }
    }
}
