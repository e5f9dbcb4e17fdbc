use chrono::NaiveDate;

use crate::model::policy::UserPolicy;
use crate::model::ticker::Tier;

/// Recomputes a ticker's scan tier (§4.2). `listed_expiries` comes from the
/// most recently cached `ChainSnapshot`, if one exists yet; with no cached
/// snapshot the high-tier "currently listed expiry" test can't run, so a
/// subscribed ticker is conservatively placed in `medium` until a snapshot
/// is available to confirm `high`.
pub fn compute_tier(
    subscriber_count: i64,
    policies: &[UserPolicy],
    listed_expiries: Option<&[NaiveDate]>,
    as_of: NaiveDate,
) -> Tier {
    if subscriber_count <= 0 {
        return Tier::Low;
    }

    let Some(listed) = listed_expiries else {
        return Tier::Medium;
    };

    let is_high = policies.iter().any(|policy| {
        policy.dte_pairs.iter().any(|rule| {
            listed.iter().any(|expiry| {
                let dte = crate::time::days_between(as_of, *expiry);
                (dte - rule.front_target).abs() <= 5
            })
        })
    });

    if is_high { Tier::High } else { Tier::Medium }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::policy::DtePairRule;

    fn policy_with_front_target(front_target: i64) -> UserPolicy {
        let mut p = UserPolicy::default();
        p.dte_pairs = vec![DtePairRule {
            front_target,
            back_target: front_target * 2,
            front_tol: 5,
            back_tol: 10,
        }];
        p
    }

    #[test]
    fn zero_subscribers_is_low() {
        let tier = compute_tier(0, &[], None, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(tier, Tier::Low);
    }

    #[test]
    fn no_snapshot_yet_is_medium() {
        let policies = [policy_with_front_target(30)];
        let tier = compute_tier(5, &policies, None, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(tier, Tier::Medium);
    }

    #[test]
    fn listed_expiry_near_front_target_is_high() {
        let as_of = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let policies = [policy_with_front_target(30)];
        let listed = [as_of + chrono::Duration::days(32)];
        let tier = compute_tier(5, &policies, Some(&listed), as_of);
        assert_eq!(tier, Tier::High);
    }

    #[test]
    fn no_matching_expiry_is_medium() {
        let as_of = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let policies = [policy_with_front_target(30)];
        let listed = [as_of + chrono::Duration::days(90)];
        let tier = compute_tier(5, &policies, Some(&listed), as_of);
        assert_eq!(tier, Tier::Medium);
    }
}
