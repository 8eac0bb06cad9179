use crate::domain::entities::{LockConfiguration, SimpleLock};
use crate::domain::errors::LockResult;
use async_trait::async_trait;

#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to acquire the named lock. Returns `None` if it is held by someone else.
    async fn lock(&self, lock_configuration: &LockConfiguration) -> LockResult<Option<SimpleLock>>;
}
