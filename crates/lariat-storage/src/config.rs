use std::sync::Arc;

use lariat_core::error::Result;
use lariat_core::storage::Storage;

use crate::file::FileStorage;
use crate::memory::MemoryStorage;
use crate::postgres::PostgresStorage;

/// Backend selection. A database DSN wins over a file path, which wins over
/// plain memory.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub postgres_dsn: Option<String>,
    pub file_path: Option<String>,
}

/// Builds the storage backend named by `config`.
pub async fn build_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    if let Some(dsn) = &config.postgres_dsn {
        let storage = PostgresStorage::connect(dsn).await?;
        tracing::info!(backend = "postgres", "storage ready");
        return Ok(Arc::new(storage));
    }

    if let Some(path) = &config.file_path {
        let storage = FileStorage::open(path.as_str(), MemoryStorage::new())?;
        tracing::info!(backend = "file", path = %path, "storage ready");
        return Ok(Arc::new(storage));
    }

    tracing::info!(backend = "in-memory", "storage ready");
    Ok(Arc::new(MemoryStorage::new()))
}
