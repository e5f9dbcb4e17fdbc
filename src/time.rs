use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// All persisted timestamps in this crate are UTC milliseconds; the only
/// place local time enters is the notification router's quiet-hours check.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// `now_ms` as whole days since the epoch, used to key the chain-snapshot
/// cache bucket and to take the UTC calendar date out of a timestamp for
/// dedupe-key derivation.
pub fn date_of_ms(ms: u64) -> chrono::NaiveDate {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .unwrap_or_default()
        .date_naive()
}

/// Integer days between `from` and `to` (`to` minus `from`), used to compute
/// days-to-expiry from an as-of date and an expiry date.
pub fn days_between(from: chrono::NaiveDate, to: chrono::NaiveDate) -> i64 {
    (to - from).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }

    #[test]
    fn days_between_is_signed() {
        let d1 = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let d2 = chrono::NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(days_between(d1, d2), 30);
        assert_eq!(days_between(d2, d1), -30);
    }
}
