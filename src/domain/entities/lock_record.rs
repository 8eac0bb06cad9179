use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted state of one named lock. Records are never deleted, only moved
/// between held and expired by changing `lock_until`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    pub name: String,
    pub lock_until: DateTime<Utc>,
    pub locked_at: DateTime<Utc>,
    pub locked_by: String,
}

impl LockRecord {
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        self.lock_until > now
    }
}
