use std::str::FromStr;

use chrono::NaiveTime;
use chrono_tz::Tz;

/// Which contract's IV represents an expiry. The spec enumerates exactly
/// these three; the engine's delta-targeting generalizes to an arbitrary
/// N but this policy surface only ever asks for 35-delta legs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolPoint {
    Atm,
    Put35Delta,
    Call35Delta,
}

impl VolPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolPoint::Atm => "ATM",
            VolPoint::Put35Delta => "35d_put",
            VolPoint::Call35Delta => "35d_call",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ATM" => Some(VolPoint::Atm),
            "35d_put" => Some(VolPoint::Put35Delta),
            "35d_call" => Some(VolPoint::Call35Delta),
            _ => None,
        }
    }
}

/// Expiry-pairing rule: pick the expiry whose DTE lies inside
/// `[target - tol, target + tol]` and is closest to the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DtePairRule {
    pub front_target: i64,
    pub back_target: i64,
    pub front_tol: i64,
    pub back_tol: i64,
}

/// User-local suppression window. `start`/`end` may wrap past midnight
/// (`end < start`), in which case the window spans the day boundary.
#[derive(Clone, Copy, Debug)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// Whether `local_time` falls inside the configured window, handling
    /// midnight wraparound (§8 boundary behaviours).
    pub fn contains(&self, local_time: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start <= self.end {
            local_time >= self.start && local_time <= self.end
        } else {
            local_time >= self.start || local_time <= self.end
        }
    }
}

/// Minimum FF delta required between successive alerts for the same key
/// (§4.4 step 2). Not user-configurable; the spec fixes the default and
/// does not expose it as a policy field.
pub const DELTA_FF_MIN: f64 = 0.02;

/// Per-user configuration (§3). `timezone` is stored pre-parsed: policy
/// writes must reject unknown IANA zones before a `UserPolicy` exists
/// (§9 "Clocks").
#[derive(Clone, Debug)]
pub struct UserPolicy {
    pub ff_threshold: f64,
    pub dte_pairs: Vec<DtePairRule>,
    pub vol_point: VolPoint,
    pub min_open_interest: i64,
    pub min_volume: i64,
    pub max_bid_ask_pct: f64,
    pub sigma_fwd_floor: f64,
    pub stability_scans: u32,
    pub cooldown_minutes: i64,
    pub quiet_hours: QuietHours,
    pub timezone: Tz,
}

impl UserPolicy {
    /// Validates a raw IANA zone string, rejecting unknown zones
    /// (§9 "Clocks").
    pub fn parse_timezone(raw: &str) -> anyhow::Result<Tz> {
        Tz::from_str(raw).map_err(|_| anyhow::anyhow!("unknown IANA timezone: {raw}"))
    }
}

impl Default for UserPolicy {
    fn default() -> Self {
        Self {
            ff_threshold: 0.20,
            dte_pairs: vec![DtePairRule {
                front_target: 30,
                back_target: 60,
                front_tol: 5,
                back_tol: 10,
            }],
            vol_point: VolPoint::Atm,
            min_open_interest: 100,
            min_volume: 10,
            max_bid_ask_pct: 0.08,
            sigma_fwd_floor: 0.05,
            stability_scans: 2,
            cooldown_minutes: 120,
            quiet_hours: QuietHours {
                enabled: false,
                start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            },
            timezone: Tz::UTC,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_hours_without_wraparound() {
        let qh = QuietHours {
            enabled: true,
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        };
        assert!(qh.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!qh.contains(NaiveTime::from_hms_opt(18, 0, 0).unwrap()));
    }

    #[test]
    fn quiet_hours_midnight_wraparound() {
        let qh = QuietHours {
            enabled: true,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        };
        assert!(qh.contains(NaiveTime::from_hms_opt(23, 15, 0).unwrap()));
        assert!(qh.contains(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
        assert!(!qh.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn disabled_quiet_hours_never_contains() {
        let qh = QuietHours {
            enabled: false,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        };
        assert!(!qh.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(UserPolicy::parse_timezone("Not/AZone").is_err());
        assert!(UserPolicy::parse_timezone("America/Vancouver").is_ok());
    }
}
