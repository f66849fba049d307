//! The error taxonomy surfaced to remote callers.
//!
//! Every failure the engine can report collapses to one of the five codes
//! in [`ErrorCode`]. [`GgConfigError`] carries the code plus a message;
//! transports map it onto whatever wire representation they use (an RPC
//! fault, an HTTP status, ...) without needing to inspect the engine's
//! internal error types.

use crate::codec::CodecError;
use crate::persistence::PersistenceError;
use crate::tree::TreeError;

/// The five error codes a remote caller can observe, per the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Missing required field, wrong container type, malformed element.
    InvalidArgument,
    /// Path too deep, a segment too long, or a value blob too large.
    OutOfRange,
    /// Path absent on `read`, `delete`, or `subscribe`.
    NotFound,
    /// Attempted leaf <-> internal node transition.
    TypeMismatch,
    /// The persistence layer failed an atomic operation.
    InternalFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "InvalidArgument",
            ErrorCode::OutOfRange => "OutOfRange",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::TypeMismatch => "TypeMismatch",
            ErrorCode::InternalFailure => "InternalFailure",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error surfaced by the engine to a request handler's caller.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GgConfigError {
    pub code: ErrorCode,
    pub message: String,
}

impl GgConfigError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        GgConfigError {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OutOfRange, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.code, ErrorCode::NotFound)
    }
}

impl From<TreeError> for GgConfigError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound => GgConfigError::new(ErrorCode::NotFound, err.to_string()),
            TreeError::TypeMismatch { .. } => GgConfigError::new(ErrorCode::TypeMismatch, err.to_string()),
            TreeError::Persistence(_) | TreeError::Codec(_) => {
                GgConfigError::new(ErrorCode::InternalFailure, err.to_string())
            }
        }
    }
}

impl From<PersistenceError> for GgConfigError {
    fn from(err: PersistenceError) -> Self {
        GgConfigError::new(ErrorCode::InternalFailure, err.to_string())
    }
}

impl From<CodecError> for GgConfigError {
    fn from(err: CodecError) -> Self {
        GgConfigError::new(ErrorCode::InvalidArgument, err.to_string())
    }
}
