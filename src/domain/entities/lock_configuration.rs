use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::errors::{LockError, LockResult};
use crate::domain::ports::clock::ClockProvider;

/// Describes one acquisition attempt of a named lock.
///
/// The lease is kept at most until `created_at + lock_at_most_for` and, once
/// released, at least until `created_at + lock_at_least_for`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfiguration {
    created_at: DateTime<Utc>,
    name: String,
    lock_at_most_for: Duration,
    lock_at_least_for: Duration,
    lock_at_most_until: DateTime<Utc>,
    lock_at_least_until: DateTime<Utc>,
}

impl LockConfiguration {
    pub fn new(
        created_at: DateTime<Utc>,
        name: impl Into<String>,
        lock_at_most_for: Duration,
        lock_at_least_for: Duration,
    ) -> LockResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LockError::InvalidConfiguration(
                "lock name can not be empty".to_string(),
            ));
        }
        if lock_at_least_for > lock_at_most_for {
            return Err(LockError::InvalidConfiguration(format!(
                "lockAtLeastFor ({:?}) is longer than lockAtMostFor ({:?}) for lock '{}'",
                lock_at_least_for, lock_at_most_for, name
            )));
        }

        let lock_at_most_until = offset(created_at, lock_at_most_for, &name)?;
        let lock_at_least_until = offset(created_at, lock_at_least_for, &name)?;

        Ok(Self {
            created_at,
            name,
            lock_at_most_for,
            lock_at_least_for,
            lock_at_most_until,
            lock_at_least_until,
        })
    }

    /// Configuration created at `ClockProvider::now()`.
    pub fn starting_now(
        name: impl Into<String>,
        lock_at_most_for: Duration,
        lock_at_least_for: Duration,
    ) -> LockResult<Self> {
        Self::new(
            ClockProvider::now(),
            name,
            lock_at_most_for,
            lock_at_least_for,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lock_at_most_for(&self) -> Duration {
        self.lock_at_most_for
    }

    pub fn lock_at_least_for(&self) -> Duration {
        self.lock_at_least_for
    }

    pub fn lock_at_most_until(&self) -> DateTime<Utc> {
        self.lock_at_most_until
    }

    pub fn lock_at_least_until(&self) -> DateTime<Utc> {
        self.lock_at_least_until
    }

    /// Instant the record is moved to on release. Never earlier than
    /// `lock_at_least_until`, evaluated when the lock is released.
    pub fn unlock_time(&self) -> DateTime<Utc> {
        let now = ClockProvider::now();
        if self.lock_at_least_until > now {
            self.lock_at_least_until
        } else {
            now
        }
    }
}

fn offset(start: DateTime<Utc>, duration: Duration, name: &str) -> LockResult<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|duration| start.checked_add_signed(duration))
        .ok_or_else(|| {
            LockError::InvalidConfiguration(format!(
                "duration {:?} is out of range for lock '{}'",
                duration, name
            ))
        })
}
