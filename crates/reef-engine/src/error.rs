//! Error types for the engine.

use std::time::Duration;

use reef_types::{ErrorCode, JobId, TransferId, TransferStatus};

/// Errors that can occur during service operations.
///
/// Component errors are wrapped unchanged; [`EngineError::code`] reports the
/// kind the component chose.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Registry or ownership error.
    #[error(transparent)]
    Registry(#[from] reef_registry::RegistryError),

    /// Transfer orchestration error.
    #[error(transparent)]
    Transfer(#[from] reef_transfer::TransferError),

    /// QoS store error.
    #[error(transparent)]
    Qos(#[from] reef_qos::QosError),

    /// Data-operation pipeline error.
    #[error(transparent)]
    DataOp(#[from] reef_dataops::DataOpError),

    /// A collaborator call failed.
    #[error("network error: {0}")]
    Net(#[from] reef_net::NetError),

    /// The transfer belongs to a different job.
    #[error("transfer {transfer} does not belong to job {job}")]
    TransferNotInJob {
        /// The transfer.
        transfer: TransferId,
        /// The calling job.
        job: JobId,
    },

    /// The transfer has already finished, failed or been cancelled.
    #[error("transfer {transfer} is already {status}")]
    TransferTerminal {
        /// The transfer.
        transfer: TransferId,
        /// Its terminal status.
        status: TransferStatus,
    },

    /// The request cannot be carried out with the information available.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// A wait or collaborator call did not finish in time.
    #[error("{what} did not complete within {after:?}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// The budget that elapsed.
        after: Duration,
    },
}

impl EngineError {
    /// The wire-level kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Registry(e) => e.code(),
            EngineError::Transfer(e) => e.code(),
            EngineError::Qos(e) => e.code(),
            EngineError::DataOp(e) => e.code(),
            EngineError::Net(e) => e.code(),
            EngineError::TransferNotInJob { .. } => ErrorCode::NotFound,
            EngineError::TransferTerminal { .. } => ErrorCode::InvalidState,
            EngineError::BadArguments(_) => ErrorCode::BadArguments,
            EngineError::Timeout { .. } => ErrorCode::Timeout,
        }
    }
}
