//! Epoch-millisecond helpers.
//!
//! Expiries and response timestamps travel as integer milliseconds since the
//! Unix epoch.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Current time as milliseconds since the Unix epoch.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Epoch milliseconds `ttl` from now, saturating at `i64::MAX`.
pub fn millis_from_now(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    epoch_millis().saturating_add(ttl)
}

/// Converts epoch milliseconds to a UTC datetime.
///
/// Returns `None` for values chrono cannot represent.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_from_now_is_in_the_future() {
        let now = epoch_millis();
        let later = millis_from_now(Duration::from_secs(60));
        assert!(later >= now + 60_000);
        assert!(later < now + 61_000);
    }

    #[test]
    fn millis_from_now_saturates() {
        assert_eq!(millis_from_now(Duration::MAX), i64::MAX);
    }

    #[test]
    fn from_epoch_millis_roundtrip() {
        let dt = from_epoch_millis(999_999_999_999).unwrap();
        assert_eq!(dt.timestamp_millis(), 999_999_999_999);
        assert_eq!(dt.to_rfc3339(), "2001-09-09T01:46:39.999+00:00");
    }

    #[test]
    fn from_epoch_millis_out_of_range() {
        assert!(from_epoch_millis(i64::MAX).is_none());
    }
}
