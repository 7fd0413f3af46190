pub mod cached;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

use std::sync::Arc;

use crate::analytics::ClickStore;
use crate::config::{DatabaseBackend, DatabaseConfig};

pub use cached::CachedStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{Storage, StorageError, StorageResult};

/// Link storage and click log backed by the same database
pub struct Backend {
    pub links: Arc<dyn Storage>,
    pub clicks: Arc<dyn ClickStore>,
}

/// Connect to the configured database and create the schema
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Backend> {
    let backend = match config.backend {
        DatabaseBackend::Sqlite => {
            let storage = Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?);
            Backend {
                links: storage.clone(),
                clicks: storage,
            }
        }
        DatabaseBackend::Postgres => {
            let storage =
                Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?);
            Backend {
                links: storage.clone(),
                clicks: storage,
            }
        }
    };

    backend.links.init().await?;
    Ok(backend)
}
