use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::policy::UserPolicy;
use crate::tracker::{CheckOutcome, STATE_TTL_SECS, StabilityState, StabilityTracker, decide, tracker_key};

/// In-memory `StabilityTracker` used by tests and by the teacher's
/// mock-repository pattern; production uses `redis_tracker::RedisStabilityTracker`.
/// The mutex stands in for Redis's single-threaded script execution — it
/// gives the same linearizability guarantee (§9 "Concurrent mutable
/// state"), just without persistence across restarts.
#[derive(Default)]
pub struct InMemoryStabilityTracker {
    state: Mutex<HashMap<String, (StabilityState, u64)>>,
}

impl InMemoryStabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StabilityTracker for InMemoryStabilityTracker {
    async fn check(
        &self,
        ticker: &str,
        front_expiry: NaiveDate,
        back_expiry: NaiveDate,
        user_id: Uuid,
        ff: f64,
        policy: &UserPolicy,
        now_ms: u64,
    ) -> anyhow::Result<CheckOutcome> {
        let key = tracker_key(ticker, front_expiry, back_expiry, user_id);
        let mut table = self.state.lock();

        let prior = table.get(&key).and_then(|(state, written_at)| {
            let expires_at = written_at.saturating_add(STATE_TTL_SECS * 1000);
            if now_ms < expires_at { Some(*state) } else { None }
        });

        let (new_state, outcome) = decide(prior, ff, policy, now_ms);
        table.insert(key, (new_state, now_ms));
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn policy() -> UserPolicy {
        UserPolicy {
            ff_threshold: 0.20,
            stability_scans: 2,
            cooldown_minutes: 120,
            ..UserPolicy::default()
        }
    }

    #[tokio::test]
    async fn concurrent_checks_on_same_key_alert_at_most_once_per_cooldown() {
        let tracker = InMemoryStabilityTracker::new();
        let front = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        let back = NaiveDate::from_ymd_opt(2026, 10, 29).unwrap();
        let user = Uuid::new_v4();
        let p = policy();

        let o1 = tracker
            .check("SPY", front, back, user, 2.637, &p, 0)
            .await
            .unwrap();
        assert_eq!(o1.reason, crate::tracker::CheckReason::FirstScan);

        let o2 = tracker
            .check("SPY", front, back, user, 2.637, &p, 180_000)
            .await
            .unwrap();
        assert!(o2.should_alert);

        // A second scan moments later must not alert again within cooldown.
        let o3 = tracker
            .check("SPY", front, back, user, 2.70, &p, 200_000)
            .await
            .unwrap();
        assert!(!o3.should_alert);
    }

    #[tokio::test]
    async fn expired_state_restarts_as_first_scan() {
        let tracker = InMemoryStabilityTracker::new();
        let front = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        let back = NaiveDate::from_ymd_opt(2026, 10, 29).unwrap();
        let user = Uuid::new_v4();
        let p = policy();

        tracker.check("SPY", front, back, user, 0.25, &p, 0).await.unwrap();

        let far_future = STATE_TTL_SECS * 1000 + 1;
        let outcome = tracker
            .check("SPY", front, back, user, 0.25, &p, far_future)
            .await
            .unwrap();
        assert_eq!(outcome.reason, crate::tracker::CheckReason::FirstScan);
    }
}
