use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::entities::{LockConfiguration, LockRecord};
use crate::domain::errors::LockResult;
use crate::domain::ports::clock::ClockProvider;
use crate::domain::ports::storage_accessor::StorageAccessor;
use crate::shared::utils::get_hostname;

/// Document store kept in process memory, one document per lock name.
///
/// Each primitive runs inside a single critical section, which gives the same
/// guarantees as a conditional document update. Only coordinates tasks within
/// one process.
pub struct InMemoryStorageAccessor {
    documents: Arc<Mutex<HashMap<String, LockRecord>>>,
    locked_by: String,
}

impl Default for InMemoryStorageAccessor {
    fn default() -> Self {
        Self::new(get_hostname())
    }
}

impl InMemoryStorageAccessor {
    pub fn new(locked_by: impl Into<String>) -> Self {
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
            locked_by: locked_by.into(),
        }
    }

    /// Accessor over the same documents acting as another holder.
    pub fn for_holder(&self, locked_by: impl Into<String>) -> Self {
        Self {
            documents: self.documents.clone(),
            locked_by: locked_by.into(),
        }
    }

    pub fn locked_by(&self) -> &str {
        &self.locked_by
    }

    pub async fn find_record(&self, name: &str) -> Option<LockRecord> {
        self.documents.lock().await.get(name).cloned()
    }

    /// Store a document as is, bypassing the lock protocol.
    pub async fn put_record(&self, record: LockRecord) {
        self.documents
            .lock()
            .await
            .insert(record.name.clone(), record);
    }
}

#[async_trait]
impl StorageAccessor for InMemoryStorageAccessor {
    async fn insert_record(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let mut documents = self.documents.lock().await;
        if documents.contains_key(lock_configuration.name()) {
            return Ok(false);
        }

        documents.insert(
            lock_configuration.name().to_string(),
            LockRecord {
                name: lock_configuration.name().to_string(),
                lock_until: lock_configuration.lock_at_most_until(),
                locked_at: ClockProvider::now(),
                locked_by: self.locked_by.clone(),
            },
        );
        Ok(true)
    }

    async fn update_record(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let now = ClockProvider::now();
        let mut documents = self.documents.lock().await;
        match documents.get_mut(lock_configuration.name()) {
            Some(record) if record.lock_until <= now => {
                record.lock_until = lock_configuration.lock_at_most_until();
                record.locked_at = now;
                record.locked_by = self.locked_by.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let now = ClockProvider::now();
        let mut documents = self.documents.lock().await;
        match documents.get_mut(lock_configuration.name()) {
            Some(record) if record.locked_by == self.locked_by && record.lock_until > now => {
                record.lock_until = lock_configuration.lock_at_most_until();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unlock(&self, lock_configuration: &LockConfiguration) -> LockResult<()> {
        let unlock_time = lock_configuration.unlock_time();
        let mut documents = self.documents.lock().await;
        if let Some(record) = documents.get_mut(lock_configuration.name()) {
            record.lock_until = unlock_time;
        }
        Ok(())
    }
}
