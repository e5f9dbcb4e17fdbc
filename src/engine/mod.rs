//! Pure, deterministic signal computation. No I/O, no clock reads except
//! `as_of` carried on the snapshot, never mutates inputs (§4.1).

use chrono::NaiveDate;
use uuid::Uuid;

use crate::model::chain::{ChainSnapshot, Contract, Expiry, Right};
use crate::model::policy::{DtePairRule, UserPolicy, VolPoint};
use crate::model::signal::Signal;

/// The closed set of engine rejection reasons (§7 `engine_reject`). Attached
/// to a signal as reason codes, or logged as a diagnostic when no signal
/// can be formed at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectReason {
    InvalidDte,
    NegativeForwardVariance,
    SigmaFwdFloor,
    MissingIv,
    MissingQuotes,
    WideSpread,
    LowOi,
    LowVolume,
    NonpositiveMid,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidDte => "invalid_dte",
            RejectReason::NegativeForwardVariance => "negative_forward_variance",
            RejectReason::SigmaFwdFloor => "sigma_fwd_floor",
            RejectReason::MissingIv => "missing_iv",
            RejectReason::MissingQuotes => "missing_quotes",
            RejectReason::WideSpread => "wide_spread",
            RejectReason::LowOi => "low_oi",
            RejectReason::LowVolume => "low_volume",
            RejectReason::NonpositiveMid => "nonpositive_mid",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForwardFactorResult {
    pub sigma_fwd: f64,
    pub ff: f64,
}

/// `forward_factor(σ1, dte1, σ2, dte2) → ff | reject` (§4.1).
pub fn forward_factor(
    sigma1: f64,
    dte1: i64,
    sigma2: f64,
    dte2: i64,
    sigma_fwd_floor: f64,
) -> Result<ForwardFactorResult, RejectReason> {
    if dte1 < 1 || dte2 < 1 {
        return Err(RejectReason::InvalidDte);
    }
    let t1 = dte1 as f64 / 365.0;
    let t2 = dte2 as f64 / 365.0;
    if t1 >= t2 {
        return Err(RejectReason::InvalidDte);
    }

    let v1 = sigma1 * sigma1 * t1;
    let v2 = sigma2 * sigma2 * t2;
    let v_fwd = (v2 - v1) / (t2 - t1);
    if v_fwd < 0.0 {
        return Err(RejectReason::NegativeForwardVariance);
    }

    let sigma_fwd = v_fwd.sqrt();
    if sigma_fwd < sigma_fwd_floor {
        return Err(RejectReason::SigmaFwdFloor);
    }

    let ff = (sigma1 - sigma_fwd) / sigma_fwd;
    Ok(ForwardFactorResult { sigma_fwd, ff })
}

fn pick_expiry(expiries: &[Expiry], as_of: NaiveDate, target: i64, tol: i64) -> Option<NaiveDate> {
    expiries
        .iter()
        .map(|e| (e.expiry_date, crate::time::days_between(as_of, e.expiry_date)))
        .filter(|(_, dte)| (*dte - target).abs() <= tol)
        .min_by(|(date_a, dte_a), (date_b, dte_b)| {
            (dte_a - target)
                .abs()
                .cmp(&(dte_b - target).abs())
                .then_with(|| date_a.cmp(date_b))
        })
        .map(|(date, _)| date)
}

/// `pair_expiries(snapshot, dte_pairs) → list<(front_expiry, back_expiry)>`
/// (§4.1). Front is picked independent of back; a rule whose front or back
/// side has no candidate, or whose picked front.dte >= back.dte, is simply
/// dropped from the result rather than surfaced as an error — there is no
/// per-pair diagnostic channel at this stage.
pub fn pair_expiries(
    snapshot: &ChainSnapshot,
    dte_pairs: &[DtePairRule],
) -> Vec<(NaiveDate, NaiveDate)> {
    let as_of = crate::time::date_of_ms(snapshot.as_of_ts);
    let mut out = Vec::with_capacity(dte_pairs.len());
    for rule in dte_pairs {
        let front = pick_expiry(&snapshot.expiries, as_of, rule.front_target, rule.front_tol);
        let back = pick_expiry(&snapshot.expiries, as_of, rule.back_target, rule.back_tol);
        if let (Some(front), Some(back)) = (front, back) {
            let front_dte = crate::time::days_between(as_of, front);
            let back_dte = crate::time::days_between(as_of, back);
            if front_dte < back_dte {
                out.push((front, back));
            }
        }
    }
    out
}

fn delta_target(n: u8) -> f64 {
    n as f64 / 100.0
}

fn select_by_delta(expiry: &Expiry, right: Right, n: u8) -> Result<(&Contract, f64), RejectReason> {
    let target = delta_target(n);
    let contract = expiry
        .contracts
        .iter()
        .filter(|c| c.right == right)
        .min_by(|a, b| {
            let da = (a.delta.map(f64::abs).unwrap_or(f64::INFINITY) - target).abs();
            let db = (b.delta.map(f64::abs).unwrap_or(f64::INFINITY) - target).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or(RejectReason::MissingIv)?;
    let iv = contract.iv.ok_or(RejectReason::MissingIv)?;
    Ok((contract, iv))
}

/// `select_vol_point(expiry, underlying_price, method) → (contract, iv) |
/// reject` (§4.1).
pub fn select_vol_point(
    expiry: &Expiry,
    underlying_price: f64,
    vol_point: VolPoint,
) -> Result<(&Contract, f64), RejectReason> {
    match vol_point {
        VolPoint::Atm => {
            let contract = expiry
                .contracts
                .iter()
                .min_by(|a, b| {
                    let da = (a.strike - underlying_price).abs();
                    let db = (b.strike - underlying_price).abs();
                    da.partial_cmp(&db)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.strike.partial_cmp(&b.strike).unwrap_or(std::cmp::Ordering::Equal))
                })
                .ok_or(RejectReason::MissingIv)?;
            let iv = contract.iv.ok_or(RejectReason::MissingIv)?;
            Ok((contract, iv))
        }
        VolPoint::Put35Delta => select_by_delta(expiry, Right::Put, 35),
        VolPoint::Call35Delta => select_by_delta(expiry, Right::Call, 35),
    }
}

/// `apply_liquidity_filters(front, back, policy) → {ok} | {reasons}` (§4.1).
/// An empty result means the pair passed every gate.
pub fn apply_liquidity_filters(
    front: &Contract,
    back: &Contract,
    policy: &UserPolicy,
) -> Vec<RejectReason> {
    let mut reasons = Vec::new();
    for leg in [front, back] {
        match (leg.bid, leg.ask) {
            (Some(bid), Some(ask)) => {
                let mid = (bid + ask) / 2.0;
                if mid <= 0.0 {
                    reasons.push(RejectReason::NonpositiveMid);
                } else if (ask - bid) / mid > policy.max_bid_ask_pct {
                    reasons.push(RejectReason::WideSpread);
                }
            }
            _ => reasons.push(RejectReason::MissingQuotes),
        }
        if leg.open_interest < policy.min_open_interest {
            reasons.push(RejectReason::LowOi);
        }
        if leg.volume < policy.min_volume {
            reasons.push(RejectReason::LowVolume);
        }
    }
    reasons.sort();
    reasons.dedup();
    reasons
}

/// `compute(snapshot, policy) → list<Signal>` (§4.1). Candidates that fail
/// vol-point selection or the forward-factor computation are logged as
/// diagnostics and produce no `Signal`; candidates below `ff_threshold`
/// are silently dropped (they are not signals at all, not rejections).
///
/// `signal_id` is left nil here — the store assigns a real id at insertion,
/// keeping this function pure: identical inputs always produce signals
/// that compare equal field-for-field except for timing-independent
/// identity (§8 property 2).
pub fn compute(snapshot: &ChainSnapshot, policy: &UserPolicy) -> Vec<Signal> {
    let as_of = crate::time::date_of_ms(snapshot.as_of_ts);
    let mut signals = Vec::new();

    for (front_date, back_date) in pair_expiries(snapshot, &policy.dte_pairs) {
        let front_expiry = match snapshot.expiries.iter().find(|e| e.expiry_date == front_date) {
            Some(e) => e,
            None => continue,
        };
        let back_expiry = match snapshot.expiries.iter().find(|e| e.expiry_date == back_date) {
            Some(e) => e,
            None => continue,
        };

        let (front_contract, front_iv) =
            match select_vol_point(front_expiry, snapshot.underlying_price, policy.vol_point) {
                Ok(v) => v,
                Err(reason) => {
                    tracing::debug!(ticker = %snapshot.ticker, reason = reason.as_str(), "vol point selection failed (front)");
                    continue;
                }
            };
        let (back_contract, back_iv) =
            match select_vol_point(back_expiry, snapshot.underlying_price, policy.vol_point) {
                Ok(v) => v,
                Err(reason) => {
                    tracing::debug!(ticker = %snapshot.ticker, reason = reason.as_str(), "vol point selection failed (back)");
                    continue;
                }
            };

        let front_dte = crate::time::days_between(as_of, front_date);
        let back_dte = crate::time::days_between(as_of, back_date);

        let ff = match forward_factor(front_iv, front_dte, back_iv, back_dte, policy.sigma_fwd_floor) {
            Ok(r) => r,
            Err(reason) => {
                tracing::debug!(ticker = %snapshot.ticker, reason = reason.as_str(), "forward factor rejected");
                continue;
            }
        };

        if ff.ff < policy.ff_threshold {
            continue;
        }

        let reasons = apply_liquidity_filters(front_contract, back_contract, policy);
        let quality_score = if reasons.is_empty() { 1.0 } else { 0.5 };

        signals.push(Signal {
            signal_id: Uuid::nil(),
            ticker: snapshot.ticker.clone(),
            as_of_ts: snapshot.as_of_ts,
            front_expiry: front_date,
            back_expiry: back_date,
            front_dte,
            back_dte,
            front_iv,
            back_iv,
            sigma_fwd: ff.sigma_fwd,
            ff_value: ff.ff,
            vol_point: policy.vol_point,
            quality_score,
            reason_codes: reasons.iter().map(|r| r.as_str().to_string()).collect(),
            dedupe_key: crate::store::dedupe_key(
                &snapshot.ticker,
                front_date,
                back_date,
                as_of,
                policy.vol_point,
            ),
        });
    }

    signals.sort_by(|a, b| b.ff_value.partial_cmp(&a.ff_value).unwrap_or(std::cmp::Ordering::Equal));
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::chain::{ChainSnapshot, Contract, Expiry, Right};
    use chrono::NaiveDate;

    fn contract(strike: f64, right: Right, iv: f64, bid: f64, ask: f64, oi: i64, vol: i64) -> Contract {
        Contract {
            strike,
            right,
            bid: Some(bid),
            ask: Some(ask),
            iv: Some(iv),
            delta: None,
            volume: vol,
            open_interest: oi,
        }
    }

    #[test]
    fn boundary_dte1_zero_rejects() {
        assert_eq!(
            forward_factor(0.3, 0, 0.2, 60, 0.0),
            Err(RejectReason::InvalidDte)
        );
    }

    #[test]
    fn boundary_dte1_equals_dte2_rejects() {
        assert_eq!(
            forward_factor(0.3, 30, 0.2, 30, 0.0),
            Err(RejectReason::InvalidDte)
        );
    }

    #[test]
    fn boundary_v_fwd_exactly_zero_compares_to_floor() {
        // sigma2^2*t2 == sigma1^2*t1 forces V_fwd = 0.
        let t1 = 30.0 / 365.0;
        let t2 = 60.0 / 365.0;
        let sigma1 = 0.3_f64;
        let v1 = sigma1 * sigma1 * t1;
        let sigma2 = (v1 / t2).sqrt();
        let result = forward_factor(sigma1, 30, sigma2, 60, 0.0);
        assert!(result.is_ok());
        assert!((result.unwrap().sigma_fwd - 0.0).abs() < 1e-9);

        // with a positive floor, sigma_fwd = 0 must reject.
        assert_eq!(
            forward_factor(sigma1, 30, sigma2, 60, 0.01),
            Err(RejectReason::SigmaFwdFloor)
        );
    }

    #[test]
    fn scenario_a_happy_path_numbers() {
        let result = forward_factor(0.30, 30, 0.22, 60, 0.05).expect("should compute");
        assert!((result.sigma_fwd - 0.08249).abs() < 1e-4);
        assert!((result.ff - 2.637).abs() < 1e-2);
    }

    #[test]
    fn scenario_e_negative_forward_variance_rejects() {
        assert_eq!(
            forward_factor(0.50, 30, 0.20, 60, 0.0),
            Err(RejectReason::NegativeForwardVariance)
        );
    }

    #[test]
    fn scenario_d_wide_spread_flags_reason_but_not_fatal() {
        let policy = UserPolicy {
            max_bid_ask_pct: 0.08,
            ..UserPolicy::default()
        };
        let front = contract(500.0, Right::Call, 0.30, 2.50, 3.00, 500, 120);
        let back = contract(500.0, Right::Call, 0.22, 4.50, 4.55, 800, 90);
        let reasons = apply_liquidity_filters(&front, &back, &policy);
        assert!(reasons.contains(&RejectReason::WideSpread));
    }

    #[test]
    fn bid_equals_ask_has_zero_spread_and_passes() {
        let policy = UserPolicy::default();
        let front = contract(500.0, Right::Call, 0.30, 3.00, 3.00, 500, 120);
        let back = contract(500.0, Right::Call, 0.22, 4.50, 4.50, 800, 90);
        let reasons = apply_liquidity_filters(&front, &back, &policy);
        assert!(!reasons.contains(&RejectReason::WideSpread));
    }

    #[test]
    fn select_vol_point_atm_picks_nearest_strike_ties_lower() {
        let expiry = Expiry {
            expiry_date: NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            contracts: vec![
                contract(495.0, Right::Call, 0.28, 3.0, 3.1, 100, 10),
                contract(505.0, Right::Call, 0.31, 3.0, 3.1, 100, 10),
            ],
        };
        let (contract, _) = select_vol_point(&expiry, 500.0, VolPoint::Atm).unwrap();
        assert_eq!(contract.strike, 495.0);
    }

    #[test]
    fn select_vol_point_missing_iv_rejects() {
        let expiry = Expiry {
            expiry_date: NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            contracts: vec![Contract {
                strike: 500.0,
                right: Right::Call,
                bid: Some(3.0),
                ask: Some(3.1),
                iv: None,
                delta: None,
                volume: 10,
                open_interest: 100,
            }],
        };
        assert_eq!(
            select_vol_point(&expiry, 500.0, VolPoint::Atm),
            Err(RejectReason::MissingIv)
        );
    }

    #[test]
    fn compute_is_idempotent_and_pure() {
        let snapshot = ChainSnapshot {
            ticker: "SPY".to_string(),
            as_of_ts: 1_700_000_000_000,
            underlying_price: 500.0,
            expiries: vec![
                Expiry {
                    expiry_date: crate::time::date_of_ms(1_700_000_000_000)
                        + chrono::Duration::days(30),
                    contracts: vec![contract(500.0, Right::Call, 0.30, 3.00, 3.10, 500, 120)],
                },
                Expiry {
                    expiry_date: crate::time::date_of_ms(1_700_000_000_000)
                        + chrono::Duration::days(60),
                    contracts: vec![contract(500.0, Right::Call, 0.22, 4.50, 4.55, 800, 90)],
                },
            ],
        };
        let policy = UserPolicy::default();
        let first = compute(&snapshot, &policy);
        let second = compute(&snapshot, &policy);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.ff_value, b.ff_value);
            assert_eq!(a.dedupe_key, b.dedupe_key);
            assert_eq!(a.reason_codes, b.reason_codes);
        }
    }

    proptest::proptest! {
        #[test]
        fn forward_factor_never_nan(
            sigma1 in 0.01_f64..5.0,
            dte1 in 1_i64..3650,
            sigma2 in 0.01_f64..5.0,
            extra in 1_i64..3650,
        ) {
            let dte2 = dte1 + extra;
            if let Ok(r) = forward_factor(sigma1, dte1, sigma2, dte2, 0.0) {
                prop_assert!(!r.ff.is_nan());
                prop_assert!(!r.sigma_fwd.is_nan());
            }
        }
    }
}
