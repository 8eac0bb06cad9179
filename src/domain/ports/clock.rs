use chrono::{DateTime, SubsecRound, Utc};
use std::sync::{Arc, RwLock};

/// Source of the current instant used by lock configurations and accessors
/// running on the caller's clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

static CLOCK: RwLock<Option<Arc<dyn Clock>>> = RwLock::new(None);

/// Process-wide clock hook.
///
/// Defaults to the system clock. Overriding it is meant for tests and must
/// happen before any lock is taken.
pub struct ClockProvider;

impl ClockProvider {
    pub fn set_clock(clock: Arc<dyn Clock>) {
        match CLOCK.write() {
            Ok(mut guard) => *guard = Some(clock),
            Err(poisoned) => *poisoned.into_inner() = Some(clock),
        }
    }

    pub fn reset_clock() {
        match CLOCK.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Current instant truncated to milliseconds.
    pub fn now() -> DateTime<Utc> {
        let now = match CLOCK.read() {
            Ok(guard) => guard.as_ref().map(|clock| clock.now()),
            Err(poisoned) => poisoned.into_inner().as_ref().map(|clock| clock.now()),
        };
        now.unwrap_or_else(Utc::now).trunc_subsecs(3)
    }
}
