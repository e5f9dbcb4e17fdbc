pub mod memory;
pub mod redis_tracker;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::model::policy::{DELTA_FF_MIN, UserPolicy};

pub const STATE_TTL_SECS: u64 = 24 * 3600;

/// Per-(ticker, expiry-pair, user) debounce/cooldown state (§3
/// `StabilityState`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilityState {
    pub last_ff: f64,
    pub consecutive_above: u32,
    pub last_alert_ts: Option<u64>,
    pub last_alert_ff: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckReason {
    FirstScan,
    NeedsStability,
    Cooldown,
    DeltaTooSmall,
    Ok,
    BelowThreshold,
}

impl CheckReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckReason::FirstScan => "first_scan",
            CheckReason::NeedsStability => "needs_stability",
            CheckReason::Cooldown => "cooldown",
            CheckReason::DeltaTooSmall => "delta_too_small",
            CheckReason::Ok => "ok",
            CheckReason::BelowThreshold => "below_threshold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "first_scan" => Some(CheckReason::FirstScan),
            "needs_stability" => Some(CheckReason::NeedsStability),
            "cooldown" => Some(CheckReason::Cooldown),
            "delta_too_small" => Some(CheckReason::DeltaTooSmall),
            "ok" => Some(CheckReason::Ok),
            "below_threshold" => Some(CheckReason::BelowThreshold),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CheckOutcome {
    pub should_alert: bool,
    pub reason: CheckReason,
}

/// Key is `stab|ticker|front_expiry_date|back_expiry_date|user_id`, using
/// expiry dates (never DTE) so keys do not drift daily (§4.4).
pub fn tracker_key(ticker: &str, front_expiry: NaiveDate, back_expiry: NaiveDate, user_id: Uuid) -> String {
    format!("stab|{ticker}|{front_expiry}|{back_expiry}|{user_id}")
}

#[async_trait]
pub trait StabilityTracker: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn check(
        &self,
        ticker: &str,
        front_expiry: NaiveDate,
        back_expiry: NaiveDate,
        user_id: Uuid,
        ff: f64,
        policy: &UserPolicy,
        now_ms: u64,
    ) -> anyhow::Result<CheckOutcome>;
}

/// The state-transition rule from §4.4, isolated as a pure function so it
/// can be tested directly and so the in-memory tracker and the Redis Lua
/// script (`redis_tracker::CHECK_SCRIPT`) can be checked against the same
/// expected outputs. `now_ms`/`cooldown_minutes` are compared in whole
/// seconds to match the precision the Lua side works in.
pub fn decide(
    prior: Option<StabilityState>,
    ff: f64,
    policy: &UserPolicy,
    now_ms: u64,
) -> (StabilityState, CheckOutcome) {
    let now_secs = now_ms / 1000;
    let cooldown_secs = (policy.cooldown_minutes.max(0) as u64) * 60;

    let Some(prior) = prior else {
        let state = StabilityState {
            last_ff: ff,
            consecutive_above: 1,
            last_alert_ts: None,
            last_alert_ff: None,
        };
        return (
            state,
            CheckOutcome {
                should_alert: false,
                reason: CheckReason::FirstScan,
            },
        );
    };

    if ff >= policy.ff_threshold {
        let consecutive_above = prior.consecutive_above + 1;

        if consecutive_above < policy.stability_scans {
            let state = StabilityState {
                last_ff: ff,
                consecutive_above,
                ..prior
            };
            return (
                state,
                CheckOutcome {
                    should_alert: false,
                    reason: CheckReason::NeedsStability,
                },
            );
        }

        if let Some(last_alert_ts) = prior.last_alert_ts {
            if now_secs.saturating_sub(last_alert_ts / 1000) < cooldown_secs {
                let state = StabilityState {
                    last_ff: ff,
                    consecutive_above,
                    ..prior
                };
                return (
                    state,
                    CheckOutcome {
                        should_alert: false,
                        reason: CheckReason::Cooldown,
                    },
                );
            }
        }

        if let Some(last_alert_ff) = prior.last_alert_ff {
            if ff - last_alert_ff < DELTA_FF_MIN {
                let state = StabilityState {
                    last_ff: ff,
                    consecutive_above,
                    ..prior
                };
                return (
                    state,
                    CheckOutcome {
                        should_alert: false,
                        reason: CheckReason::DeltaTooSmall,
                    },
                );
            }
        }

        let state = StabilityState {
            last_ff: ff,
            consecutive_above,
            last_alert_ts: Some(now_ms),
            last_alert_ff: Some(ff),
        };
        (
            state,
            CheckOutcome {
                should_alert: true,
                reason: CheckReason::Ok,
            },
        )
    } else {
        let state = StabilityState {
            last_ff: ff,
            consecutive_above: 0,
            ..prior
        };
        (
            state,
            CheckOutcome {
                should_alert: false,
                reason: CheckReason::BelowThreshold,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> UserPolicy {
        UserPolicy {
            ff_threshold: 0.20,
            stability_scans: 2,
            cooldown_minutes: 120,
            ..UserPolicy::default()
        }
    }

    #[test]
    fn scenario_a_happy_path() {
        let p = policy();
        let (state, outcome) = decide(None, 2.637, &p, 0);
        assert_eq!(outcome.reason, CheckReason::FirstScan);
        assert!(!outcome.should_alert);

        let (state, outcome) = decide(Some(state), 2.637, &p, 180_000);
        assert_eq!(outcome.reason, CheckReason::Ok);
        assert!(outcome.should_alert);
        assert_eq!(state.last_alert_ff, Some(2.637));
    }

    #[test]
    fn scenario_b_one_tick_spike_never_alerts() {
        let p = policy();
        let (s1, o1) = decide(None, 0.30, &p, 0);
        assert_eq!(o1.reason, CheckReason::FirstScan);

        let (s2, o2) = decide(Some(s1), 0.02, &p, 180_000);
        assert_eq!(o2.reason, CheckReason::BelowThreshold);
        assert_eq!(s2.consecutive_above, 0);

        let (_, o3) = decide(Some(s2), 0.28, &p, 360_000);
        assert_eq!(o3.reason, CheckReason::NeedsStability);
        assert!(!o3.should_alert);
    }

    #[test]
    fn scenario_c_cooldown_then_delta_too_small_then_alert() {
        let p = policy();
        let (s1, _) = decide(None, 2.637, &p, 0);
        let (s2, o2) = decide(Some(s1), 2.637, &p, 180_000);
        assert!(o2.should_alert);

        // +30min, still above threshold, within cooldown.
        let (s3, o3) = decide(Some(s2), 2.7, &p, 180_000 + 30 * 60_000);
        assert_eq!(o3.reason, CheckReason::Cooldown);

        // +2h05m from the alert, past cooldown, delta too small (2.650 -
        // 2.637 = 0.013 < 0.02).
        let (_, o4) = decide(Some(s3), 2.650, &p, 180_000 + 2 * 3_600_000 + 5 * 60_000);
        assert_eq!(o4.reason, CheckReason::DeltaTooSmall);

        // same elapsed time, bigger delta: alerts.
        let (_, o5) = decide(Some(s3), 2.80, &p, 180_000 + 2 * 3_600_000 + 5 * 60_000);
        assert_eq!(o5.reason, CheckReason::Ok);
        assert!(o5.should_alert);
    }

    #[test]
    fn stability_scans_one_alerts_on_first_pass_meeting_threshold() {
        let p = UserPolicy {
            stability_scans: 1,
            ..policy()
        };
        let (state, outcome) = decide(None, 0.5, &p, 0);
        assert_eq!(outcome.reason, CheckReason::FirstScan);
        // consecutive_above is 1 after the first scan already; stability_scans=1
        // means the very next qualifying scan alerts.
        let (_, outcome) = decide(Some(state), 0.5, &p, 1_000);
        assert_eq!(outcome.reason, CheckReason::Ok);
    }
}
