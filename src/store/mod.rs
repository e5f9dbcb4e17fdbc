pub mod directory;
pub mod directory_sqlx;
pub mod memory;
pub mod repository;
pub mod repository_sqlx;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::model::policy::VolPoint;

pub use directory::Directory;
pub use directory_sqlx::SqlxDirectory;
pub use repository::{DecisionExtras, SignalStore};
pub use repository_sqlx::SqlxSignalStore;

/// `H(ticker || front_expiry_iso || back_expiry_iso || date_of(as_of_ts) ||
/// vol_point)` (§4.5). `vol_point` is part of the key per the spec's Open
/// Question resolution — a policy switch between vol points is a distinct
/// logical signal.
pub fn dedupe_key(
    ticker: &str,
    front_expiry: NaiveDate,
    back_expiry: NaiveDate,
    as_of_date: NaiveDate,
    vol_point: VolPoint,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticker.as_bytes());
    hasher.update(b"|");
    hasher.update(front_expiry.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(back_expiry.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(as_of_date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(vol_point.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates() -> (NaiveDate, NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 29).unwrap(),
        )
    }

    #[test]
    fn deterministic_and_stable() {
        let (as_of, front, back) = dates();
        let a = dedupe_key("SPY", front, back, as_of, VolPoint::Atm);
        let b = dedupe_key("SPY", front, back, as_of, VolPoint::Atm);
        assert_eq!(a, b);
    }

    #[test]
    fn vol_point_changes_key() {
        let (as_of, front, back) = dates();
        let a = dedupe_key("SPY", front, back, as_of, VolPoint::Atm);
        let b = dedupe_key("SPY", front, back, as_of, VolPoint::Put35Delta);
        assert_ne!(a, b);
    }

    #[test]
    fn ticker_changes_key() {
        let (as_of, front, back) = dates();
        let a = dedupe_key("SPY", front, back, as_of, VolPoint::Atm);
        let b = dedupe_key("QQQ", front, back, as_of, VolPoint::Atm);
        assert_ne!(a, b);
    }
}
