use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::entities::{HandleState, LockConfiguration};
use crate::domain::errors::{LockError, LockResult};
use crate::domain::ports::clock::ClockProvider;
use crate::domain::ports::storage_accessor::StorageAccessor;

/// Handle to an acquired lease.
///
/// Holds only the accessor, not the provider that created it. A handle can be
/// released or extended once; later calls fail with `LockError::HandleConsumed`
/// and never reach the backend.
pub struct SimpleLock {
    lock_configuration: LockConfiguration,
    accessor: Arc<dyn StorageAccessor>,
    state: HandleState,
}

impl SimpleLock {
    pub fn new(lock_configuration: LockConfiguration, accessor: Arc<dyn StorageAccessor>) -> Self {
        Self {
            lock_configuration,
            accessor,
            state: HandleState::Active,
        }
    }

    pub fn name(&self) -> &str {
        self.lock_configuration.name()
    }

    pub fn lock_configuration(&self) -> &LockConfiguration {
        &self.lock_configuration
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Release the lease, keeping it until `lock_at_least_until` if that is
    /// still ahead. Backend failures are logged, not returned.
    pub async fn unlock(&mut self) -> LockResult<()> {
        self.check_active()?;
        self.state = HandleState::Released;

        debug!(
            "Releasing lock '{}' until {}",
            self.name(),
            self.lock_configuration.unlock_time()
        );
        if let Err(e) = self.accessor.unlock(&self.lock_configuration).await {
            warn!("Failed to release lock '{}': {}", self.name(), e);
        }
        Ok(())
    }

    /// Prolong the lease, measuring both durations from now.
    ///
    /// Returns the replacement handle, or `None` when the lease was already
    /// lost. This handle is unusable afterwards in both cases.
    pub async fn extend(
        &mut self,
        lock_at_most_for: Duration,
        lock_at_least_for: Duration,
    ) -> LockResult<Option<SimpleLock>> {
        self.check_active()?;

        let extended = LockConfiguration::new(
            ClockProvider::now(),
            self.name(),
            lock_at_most_for,
            lock_at_least_for,
        )?;

        debug!(
            "Extending lock '{}' until {}",
            self.name(),
            extended.lock_at_most_until()
        );
        let result = self.accessor.extend(&extended).await?;
        self.state = HandleState::Extended;

        if result {
            Ok(Some(SimpleLock::new(extended, self.accessor.clone())))
        } else {
            debug!("Lock '{}' could not be extended", self.name());
            Ok(None)
        }
    }

    fn check_active(&self) -> LockResult<()> {
        match self.state {
            HandleState::Active => Ok(()),
            state => Err(LockError::HandleConsumed {
                name: self.name().to_string(),
                state,
            }),
        }
    }
}

impl fmt::Debug for SimpleLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleLock")
            .field("lock_configuration", &self.lock_configuration)
            .field("state", &self.state)
            .finish()
    }
}
