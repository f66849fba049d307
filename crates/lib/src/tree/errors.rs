//! Errors raised by the tree store.

use crate::codec::CodecError;
use crate::persistence::PersistenceError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TreeError {
    #[error("path not found")]
    NotFound,

    #[error("type mismatch: {reason}")]
    TypeMismatch { reason: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("corrupt stored value: {0}")]
    Codec(#[from] CodecError),
}

impl TreeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TreeError::NotFound)
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, TreeError::TypeMismatch { .. })
    }

    pub fn is_persistence_error(&self) -> bool {
        matches!(self, TreeError::Persistence(_) | TreeError::Codec(_))
    }

    pub(crate) fn type_mismatch(reason: impl Into<String>) -> Self {
        TreeError::TypeMismatch { reason: reason.into() }
    }
}
