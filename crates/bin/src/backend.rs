//! Backend creation and labeling, shared by every command that opens a
//! store directly against local storage.

use std::path::PathBuf;
use std::sync::Arc;

use ggconfig::persistence::memory::InMemoryBackend;
use ggconfig::persistence::sqlite::SqliteBackend;
use ggconfig::persistence::PersistenceBackend;

use crate::cli::{Backend, BackendConfig};

/// Create the persistence backend selected by `config`.
pub async fn create_backend(config: &BackendConfig) -> Result<Arc<dyn PersistenceBackend>, Box<dyn std::error::Error>> {
    let data_dir = config.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&data_dir).await?;

    match config.backend {
        Backend::Sqlite => {
            let db_path = data_dir.join("ggconfig.db");
            tracing::info!("using sqlite backend at {}", db_path.display());
            Ok(Arc::new(SqliteBackend::open(&db_path).await?))
        }
        Backend::Inmemory => {
            tracing::info!("using in-memory backend (not persisted across restarts)");
            Ok(Arc::new(InMemoryBackend::new()))
        }
    }
}

/// A human-readable label for the backend type and its storage location.
pub fn backend_label(config: &BackendConfig) -> String {
    let data_dir = config.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    match config.backend {
        Backend::Sqlite => format!("sqlite ({})", data_dir.join("ggconfig.db").display()),
        Backend::Inmemory => "inmemory (ephemeral)".to_string(),
    }
}
