use std::sync::Arc;

use crate::application::services::StorageLockProvider;
use crate::config::{Backend, Config};
use crate::domain::errors::LockError;
use crate::domain::ports::lock_provider::LockProvider;
use crate::infrastructure::persistence::{
    Database, InMemoryStorageAccessor, SqlConfiguration, SqlStorageAccessor,
};
use crate::infrastructure::providers::RedisStorageAccessor;

/// Build the lock provider for the configured backend.
pub async fn build_lock_provider(
    config: &Config,
) -> Result<Arc<dyn LockProvider>, Box<dyn std::error::Error>> {
    let provider: Arc<dyn LockProvider> = match config.backend {
        Backend::Sqlite => {
            let db = Database::connect(&config.database_url).await?;
            tracing::info!("Database connection established");

            let sql_config = SqlConfiguration::new()
                .with_table_name(config.table_name.clone())
                .with_use_db_time(config.use_db_time)
                .with_locked_by(config.locked_by.clone());
            let accessor = SqlStorageAccessor::new(db, sql_config)?;

            accessor.create_table_if_missing().await?;
            tracing::info!("Lock table '{}' ready", config.table_name);

            Arc::new(StorageLockProvider::new(accessor))
        }
        Backend::Redis => {
            if config.use_db_time {
                tracing::info!("Redis expires keys on the server clock, OXILOCK_USE_DB_TIME is implied");
            }
            let accessor = RedisStorageAccessor::connect(&config.redis_url, config.redis_env.clone())
                .await?
                .with_key_prefix(config.key_prefix.clone())
                .with_locked_by(config.locked_by.clone());
            tracing::info!("Redis connection established");

            Arc::new(StorageLockProvider::new(accessor))
        }
        Backend::Memory => {
            if config.use_db_time {
                return Err(LockError::UnsupportedDbTime(Backend::Memory.to_string()).into());
            }
            Arc::new(StorageLockProvider::new(InMemoryStorageAccessor::new(
                config.locked_by.clone(),
            )))
        }
    };

    tracing::info!(
        "Lock provider initialized (backend: {}, locked_by: {})",
        config.backend,
        config.locked_by
    );
    Ok(provider)
}
