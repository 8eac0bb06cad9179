use crate::domain::entities::LockConfiguration;
use crate::domain::errors::LockResult;
use async_trait::async_trait;

/// The four atomic primitives a backend implements against one lock record.
///
/// Every primitive must be a single atomic operation on the backend: the
/// predicate and the write are evaluated against one reading of "now".
#[async_trait]
pub trait StorageAccessor: Send + Sync {
    /// Creates the record for `lock_configuration.name()` if none exists.
    /// Returns `Ok(false)` when the record is already there.
    async fn insert_record(&self, lock_configuration: &LockConfiguration) -> LockResult<bool>;

    /// Takes over the record if its `lock_until` is not in the future.
    async fn update_record(&self, lock_configuration: &LockConfiguration) -> LockResult<bool>;

    /// Moves `lock_until` of a lease this holder still owns.
    async fn extend(&self, lock_configuration: &LockConfiguration) -> LockResult<bool>;

    /// Sets `lock_until` to the unlock time of the configuration.
    /// Callers log and drop the error; the lease expires on its own.
    async fn unlock(&self, lock_configuration: &LockConfiguration) -> LockResult<()>;
}
