//! Errors surfaced by persistence backends.

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PersistenceError {
    #[error("persistence backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {reason}")]
    Sqlite {
        reason: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("stored row is corrupt at path {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

impl PersistenceError {
    pub fn is_io_error(&self) -> bool {
        matches!(self, PersistenceError::Io(_))
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, PersistenceError::Corrupt { .. })
    }
}
