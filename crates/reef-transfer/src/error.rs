//! Error types for transfer orchestration.

use reef_types::{ErrorCode, TransferId, TransferMapping, TransferStatus};

/// Errors returned by [`TransferOrchestrator`](crate::TransferOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// No transfer with this id exists.
    #[error("transfer {0} not found")]
    NotFound(TransferId),

    /// The transfer exists but is no longer eligible for scheduling.
    #[error("transfer {id} is {status}, not schedulable")]
    NotSchedulable {
        /// The transfer.
        id: TransferId,
        /// Its current status.
        status: TransferStatus,
    },

    /// Source and target counts do not fit the mapping.
    #[error("{sources} sources and {targets} targets do not fit mapping {mapping:?}")]
    MappingMismatch {
        /// Requested mapping.
        mapping: TransferMapping,
        /// Number of sources supplied.
        sources: usize,
        /// Number of targets supplied.
        targets: usize,
    },

    /// The requested status change is not allowed.
    #[error("transfer {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The transfer.
        id: TransferId,
        /// Current status.
        from: TransferStatus,
        /// Requested status.
        to: TransferStatus,
    },

    /// The identifier space is exhausted.
    #[error("out of identifiers")]
    IdsExhausted,
}

impl TransferError {
    /// The wire-level kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            TransferError::NotFound(_) | TransferError::NotSchedulable { .. } => {
                ErrorCode::NotFound
            }
            TransferError::MappingMismatch { .. } => ErrorCode::BadArguments,
            TransferError::InvalidTransition { .. } => ErrorCode::InvalidState,
            TransferError::IdsExhausted => ErrorCode::ResourceExhausted,
        }
    }
}
