//! Error types for the data-operation pipeline.

use reef_types::{DataOpStatus, DataOperationId, ErrorCode, JobId};

/// Errors returned by [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataOpError {
    /// No operation with this id belongs to the job.
    #[error("data operation {op} not found for job {job}")]
    NotFound {
        /// Calling job.
        job: JobId,
        /// Requested operation.
        op: DataOperationId,
    },

    /// The transition is not valid from the operation's current state.
    #[error("data operation {op} is {status}, cannot {action}")]
    InvalidState {
        /// The operation.
        op: DataOperationId,
        /// Its current state.
        status: DataOpStatus,
        /// The rejected transition.
        action: &'static str,
    },

    /// The operation definition is malformed.
    #[error("bad arguments: {0}")]
    BadArguments(&'static str),

    /// The identifier space is exhausted.
    #[error("out of identifiers")]
    IdsExhausted,
}

impl DataOpError {
    /// The wire-level kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DataOpError::NotFound { .. } => ErrorCode::NotFound,
            DataOpError::InvalidState { .. } => ErrorCode::InvalidState,
            DataOpError::BadArguments(_) => ErrorCode::BadArguments,
            DataOpError::IdsExhausted => ErrorCode::ResourceExhausted,
        }
    }
}
