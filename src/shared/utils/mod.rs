/// Utility modules
pub mod duration;
pub mod timestamp;

pub use duration::parse_duration;
pub use timestamp::{format_timestamp, parse_timestamp};

/// Default holder identity written to `locked_by`.
///
/// Falls back to "unknown" when the hostname can not be read or is not valid
/// UTF-8.
///
/// # Examples
///
/// ```
/// let holder = oxilock::shared::utils::get_hostname();
/// assert!(!holder.is_empty());
/// ```
pub fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_hostname_is_stable() {
        assert_eq!(get_hostname(), get_hostname());
    }
}
