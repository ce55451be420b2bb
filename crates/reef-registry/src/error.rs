//! Error types for the registry.

use reef_types::{AdhocStorageId, ErrorCode, JobId, PfsStorageId};

/// Errors returned by [`Registry`](crate::Registry) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No job with this id is registered.
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// No job with this scheduler id is registered.
    #[error("no job registered for slurm job {0}")]
    SlurmJobNotFound(u64),

    /// No ad-hoc storage with this id is registered.
    #[error("adhoc storage {0} not found")]
    AdhocStorageNotFound(AdhocStorageId),

    /// No PFS storage with this id is registered.
    #[error("pfs storage {0} not found")]
    PfsStorageNotFound(PfsStorageId),

    /// No storage of either kind carries this id.
    #[error("storage {0} not found")]
    StorageNotFound(u64),

    /// The request is inconsistent with the registry contents.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// The ad-hoc storage is bound to another job.
    #[error("adhoc storage {adhoc} is in use by job {client}")]
    AdhocInUse {
        /// The contended storage.
        adhoc: AdhocStorageId,
        /// The job currently bound to it.
        client: JobId,
    },

    /// The job is already the client of another ad-hoc storage.
    #[error("job {job} is already bound to adhoc storage {adhoc}")]
    JobAlreadyBound {
        /// The job.
        job: JobId,
        /// The storage it holds.
        adhoc: AdhocStorageId,
    },

    /// The ad-hoc storage is deployed or being deployed.
    #[error("adhoc storage {0} is already deployed")]
    AlreadyDeployed(AdhocStorageId),

    /// The ad-hoc storage is not in a state that allows the operation.
    #[error("adhoc storage {adhoc}: {reason}")]
    InvalidState {
        /// The storage in question.
        adhoc: AdhocStorageId,
        /// What prevented the operation.
        reason: &'static str,
    },

    /// The identifier space is exhausted.
    #[error("out of identifiers")]
    IdsExhausted,
}

impl RegistryError {
    /// The wire-level kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::JobNotFound(_)
            | RegistryError::SlurmJobNotFound(_)
            | RegistryError::AdhocStorageNotFound(_)
            | RegistryError::PfsStorageNotFound(_)
            | RegistryError::StorageNotFound(_) => ErrorCode::NotFound,
            RegistryError::BadArguments(_) => ErrorCode::BadArguments,
            RegistryError::AdhocInUse { .. } | RegistryError::JobAlreadyBound { .. } => {
                ErrorCode::AdhocInUse
            }
            RegistryError::AlreadyDeployed(_) => ErrorCode::AlreadyDeployed,
            RegistryError::InvalidState { .. } => ErrorCode::InvalidState,
            RegistryError::IdsExhausted => ErrorCode::ResourceExhausted,
        }
    }
}
