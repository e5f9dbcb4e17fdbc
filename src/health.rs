use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sqlx::AnyPool;

/// Shared last-heartbeat timestamp, updated by a worker on every poll
/// iteration of its run loop. `health::check` compares it against the
/// scan cadence to decide "at least one worker in READY state within the
/// last cadence window" (§6).
#[derive(Clone, Default)]
pub struct Heartbeat(Arc<AtomicU64>);

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_beat_ms(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthReport {
    pub cache_reachable: bool,
    pub db_reachable: bool,
    pub worker_heartbeat_fresh: bool,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.cache_reachable && self.db_reachable && self.worker_heartbeat_fresh
    }
}

/// Answers healthy iff cache reachable, DB reachable, and at least one
/// worker heartbeat landed within `cadence_ms` of `now_ms` (§6).
pub async fn check(
    db: &AnyPool,
    cache: &ConnectionManager,
    heartbeat: &Heartbeat,
    cadence_ms: u64,
    now_ms: u64,
) -> HealthReport {
    let db_reachable = sqlx::query("SELECT 1;").execute(db).await.is_ok();

    let cache_reachable = {
        let mut conn = cache.clone();
        conn.set_ex::<_, _, ()>("healthcheck", 1, 5).await.is_ok()
    };

    let last_beat = heartbeat.last_beat_ms();
    let worker_heartbeat_fresh = last_beat != 0 && now_ms.saturating_sub(last_beat) <= cadence_ms;

    HealthReport {
        cache_reachable,
        db_reachable,
        worker_heartbeat_fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_heartbeat_is_unhealthy() {
        let report = HealthReport {
            cache_reachable: true,
            db_reachable: true,
            worker_heartbeat_fresh: false,
        };
        assert!(!report.healthy());
    }

    #[test]
    fn all_green_is_healthy() {
        let report = HealthReport {
            cache_reachable: true,
            db_reachable: true,
            worker_heartbeat_fresh: true,
        };
        assert!(report.healthy());
    }

    #[test]
    fn heartbeat_freshness_window() {
        let hb = Heartbeat::new();
        hb.beat(1_000);
        assert_eq!(hb.last_beat_ms(), 1_000);
    }
}
