//! Error types for network operations.

use reef_types::ErrorCode;

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A frame exceeded the size limit.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Announced length.
        len: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// The peer closed the connection before answering.
    #[error("connection closed by peer")]
    Closed,

    /// The peer answered with an error code.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Error code carried in the response.
        code: ErrorCode,
        /// Error description carried in the response.
        message: String,
    },

    /// The peer answered with a payload of the wrong shape.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// A hostname could not be resolved.
    #[error("cannot resolve {0}")]
    Resolve(String),
}

impl NetError {
    /// The wire-level kind of this error.
    ///
    /// Remote errors keep the code the peer reported.
    pub fn code(&self) -> ErrorCode {
        match self {
            NetError::Remote { code, .. } => *code,
            NetError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => ErrorCode::Timeout,
            NetError::FrameTooLarge { .. } => ErrorCode::BadArguments,
            NetError::Resolve(_) => ErrorCode::NotFound,
            NetError::Io(_)
            | NetError::Serialization(_)
            | NetError::Closed
            | NetError::UnexpectedReply(_) => ErrorCode::Undetermined,
        }
    }
}
