//! Error types for the QoS store.

use reef_types::{ErrorCode, QosEntity, QosScope};

/// Errors returned by [`QosStore`](crate::QosStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QosError {
    /// The requested scope does not match the entity kind.
    #[error("entity {entity} is not in scope {scope:?}")]
    ScopeMismatch {
        /// Requested scope.
        scope: QosScope,
        /// The entity.
        entity: QosEntity,
    },

    /// No limits are recorded for the entity.
    #[error("no limits recorded for {0}")]
    NotFound(QosEntity),
}

impl QosError {
    /// The wire-level kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            QosError::ScopeMismatch { .. } => ErrorCode::BadArguments,
            QosError::NotFound(_) => ErrorCode::NotFound,
        }
    }
}
