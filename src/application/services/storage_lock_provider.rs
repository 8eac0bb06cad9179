use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::domain::entities::{LockConfiguration, SimpleLock};
use crate::domain::errors::LockResult;
use crate::domain::ports::lock_provider::LockProvider;
use crate::domain::ports::storage_accessor::StorageAccessor;

/// Names whose lock record is known to exist in the backend, so the insert
/// attempt can be skipped.
#[derive(Default)]
pub struct LockRecordRegistry {
    names: Mutex<HashSet<String>>,
}

impl LockRecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(name.to_string());
        }
    }

    pub fn remove(&self, name: &str) {
        if let Ok(mut names) = self.names.lock() {
            names.remove(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .lock()
            .map(|names| names.contains(name))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut names) = self.names.lock() {
            names.clear();
        }
    }
}

/// Backend-agnostic lock provider driving a `StorageAccessor`.
///
/// Acquisition tries `insert_record` first, then `update_record`.
pub struct StorageLockProvider<A: StorageAccessor + 'static> {
    accessor: Arc<A>,
    registry: LockRecordRegistry,
}

impl<A: StorageAccessor + 'static> StorageLockProvider<A> {
    pub fn new(accessor: A) -> Self {
        Self::from_arc(Arc::new(accessor))
    }

    pub fn from_arc(accessor: Arc<A>) -> Self {
        Self {
            accessor,
            registry: LockRecordRegistry::new(),
        }
    }

    pub fn accessor(&self) -> &Arc<A> {
        &self.accessor
    }

    /// Forget which lock records exist, e.g. after the table was recreated.
    pub fn clear_cache(&self) {
        self.registry.clear();
    }

    async fn do_lock(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let name = lock_configuration.name();
        let try_insert = !self.registry.contains(name);

        if try_insert {
            match self.accessor.insert_record(lock_configuration).await {
                Ok(true) => {
                    debug!("Created lock record '{}'", name);
                    self.registry.add(name);
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => {
                    // An existing record is handled by the update below.
                    warn!("Insert of lock record '{}' failed: {}", name, e);
                }
            }
            self.registry.add(name);
        }

        match self.accessor.update_record(lock_configuration).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                self.registry.remove(name);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<A: StorageAccessor + 'static> LockProvider for StorageLockProvider<A> {
    async fn lock(&self, lock_configuration: &LockConfiguration) -> LockResult<Option<SimpleLock>> {
        let acquired = self.do_lock(lock_configuration).await?;

        let outcome = if acquired { "acquired" } else { "busy" };
        metrics::counter!(
            "oxilock_lock_attempts_total",
            "lock" => lock_configuration.name().to_string(),
            "outcome" => outcome
        )
        .increment(1);

        if acquired {
            debug!(
                "Locked '{}', lock will be held at most until {}",
                lock_configuration.name(),
                lock_configuration.lock_at_most_until()
            );
            let accessor: Arc<dyn StorageAccessor> = self.accessor.clone();
            Ok(Some(SimpleLock::new(lock_configuration.clone(), accessor)))
        } else {
            Ok(None)
        }
    }
}
