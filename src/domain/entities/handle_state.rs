use std::fmt;

/// Lifecycle of a `SimpleLock` handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    Released,
    /// Replaced by the handle returned from an extension attempt.
    Extended,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleState::Active => write!(f, "active"),
            HandleState::Released => write!(f, "released"),
            HandleState::Extended => write!(f, "extended"),
        }
    }
}
