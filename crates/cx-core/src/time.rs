//! Time utilities for cf-expose

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in seconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Build a tunnel name unique per second: `{prefix}-{unix_seconds}`
pub fn timestamped_name(prefix: &str) -> String {
    format!("{}-{}", prefix, current_time_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_secs_is_positive() {
        assert!(current_time_secs() > 0);
    }

    #[test]
    fn test_timestamped_name() {
        let name = timestamped_name("cf-expose");
        let suffix = name.strip_prefix("cf-expose-").unwrap();
        assert!(suffix.parse::<u64>().is_ok());
    }
}
