use chrono::NaiveDate;
use uuid::Uuid;

use super::policy::VolPoint;

/// Immutable record emitted by the engine (§3). Invariants: front-dte <
/// back-dte, sigma_fwd >= sigma_fwd_floor at emission time, ff_value >=
/// effective threshold.
#[derive(Clone, Debug)]
pub struct Signal {
    pub signal_id: Uuid,
    pub ticker: String,
    pub as_of_ts: u64,
    pub front_expiry: NaiveDate,
    pub back_expiry: NaiveDate,
    pub front_dte: i64,
    pub back_dte: i64,
    pub front_iv: f64,
    pub back_iv: f64,
    pub sigma_fwd: f64,
    pub ff_value: f64,
    pub vol_point: VolPoint,
    pub quality_score: f64,
    pub reason_codes: Vec<String>,
    pub dedupe_key: String,
}
