//! Error codes carried in every RPC response.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of an operation, as reported across the wire.
///
/// Every component error maps onto exactly one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The operation succeeded.
    Success,
    /// A referenced entity is unknown or already destroyed.
    NotFound,
    /// The input is structurally invalid.
    BadArguments,
    /// The ad-hoc storage is bound to another job.
    AdhocInUse,
    /// The ad-hoc storage already has a deployment.
    AlreadyDeployed,
    /// The operation is not valid from the entity's current state.
    InvalidState,
    /// Identifiers or memory ran out.
    ResourceExhausted,
    /// An external collaborator did not answer in time.
    Timeout,
    /// Any other failure.
    Undetermined,
}

impl ErrorCode {
    /// Whether this code reports success.
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Short snake_case name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::NotFound => "not_found",
            ErrorCode::BadArguments => "bad_arguments",
            ErrorCode::AdhocInUse => "adhoc_in_use",
            ErrorCode::AlreadyDeployed => "already_deployed",
            ErrorCode::InvalidState => "invalid_state",
            ErrorCode::ResourceExhausted => "resource_exhausted",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Undetermined => "undetermined",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
