// /src/errors.rs
//! Error types for snapshot building, reconciliation and plan application
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("Malformed input: {details}")]
    MalformedInput { details: String },

    #[error("Reconciler halted after a failed apply: {reason}")]
    Halted { reason: String },

    #[error("Reconciler has been dismantled")]
    Dismantled,

    #[error("Failed to spawn reconciliation worker '{name}': {details}")]
    WorkerSpawn { name: String, details: String },

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl ReconcilerError {
    pub(crate) fn duplicate_item(item: impl std::fmt::Debug, first: impl std::fmt::Display, second: impl std::fmt::Display) -> Self {
        ReconcilerError::MalformedInput {
            details: format!("item identity {:?} appears at {} and {}", item, first, second),
        }
    }

    pub(crate) fn duplicate_section(section: impl std::fmt::Debug, first: usize, second: usize) -> Self {
        ReconcilerError::MalformedInput {
            details: format!("section identity {:?} appears at indices {} and {}", section, first, second),
        }
    }
}

/// Raised by a list control that cannot apply a plan or refresh.
///
/// Any of these is fatal to the reconciler that dispatched the plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Plan is inconsistent with the displayed rows: {details}")]
    Inconsistent { details: String },

    #[error("{what} index {index} is out of range (count {count})")]
    OutOfRange { what: &'static str, index: usize, count: usize },

    #[error("List control rejected the update: {0}")]
    Rejected(String),
}

impl ApplyError {
    pub(crate) fn inconsistent(details: impl Into<String>) -> Self {
        ApplyError::Inconsistent { details: details.into() }
    }
}
