use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::NaiveTime;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::model::policy::{DtePairRule, QuietHours, UserPolicy, VolPoint};
use crate::model::ticker::{Ticker, Tier};
use crate::store::directory::Directory;

pub struct SqlxDirectory {
    pool: AnyPool,
}

impl SqlxDirectory {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for SqlxDirectory {
    async fn active_tickers(&self) -> anyhow::Result<Vec<Ticker>> {
        let rows = sqlx::query(
            r#"SELECT symbol, active_subscriber_count, last_scan_at, tier
FROM tickers WHERE active_subscriber_count > 0;"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for r in rows {
            match row_to_ticker(&r) {
                Ok(t) => out.push(t),
                Err(e) => tracing::warn!(error = %e, "skipping malformed ticker row"),
            }
        }
        Ok(out)
    }

    async fn get_ticker(&self, symbol: &str) -> anyhow::Result<Option<Ticker>> {
        let row = sqlx::query("SELECT symbol, active_subscriber_count, last_scan_at, tier FROM tickers WHERE symbol = ?;")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_ticker(&r)).transpose()
    }

    async fn set_ticker_tier(&self, ticker: &str, tier: Tier) -> anyhow::Result<()> {
        sqlx::query("UPDATE tickers SET tier = ? WHERE symbol = ?;")
            .bind(tier.as_str())
            .bind(ticker)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_last_scan_at(&self, ticker: &str, at_ms: u64) -> anyhow::Result<()> {
        sqlx::query("UPDATE tickers SET last_scan_at = ? WHERE symbol = ?;")
            .bind(u64_to_i64(at_ms)?)
            .bind(ticker)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribers(&self, ticker: &str) -> anyhow::Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM subscriptions WHERE ticker = ? AND active = 1;")
            .bind(ticker)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::new();
        for r in rows {
            let raw: String = r.get("user_id");
            match Uuid::parse_str(&raw) {
                Ok(id) => out.push(id),
                Err(e) => tracing::warn!(error = %e, "skipping malformed subscription row"),
            }
        }
        Ok(out)
    }

    async fn get_policy(&self, user_id: Uuid) -> anyhow::Result<Option<UserPolicy>> {
        let row = sqlx::query(
            r#"SELECT ff_threshold, dte_pairs, vol_point, min_open_interest, min_volume,
       max_bid_ask_pct, sigma_fwd_floor, stability_scans, cooldown_minutes,
       quiet_hours_enabled, quiet_hours_start, quiet_hours_end, timezone
FROM user_policies WHERE user_id = ?;"#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_policy(&r)).transpose()
    }

    async fn get_policies(&self, user_ids: &[Uuid]) -> anyhow::Result<std::collections::HashMap<Uuid, UserPolicy>> {
        let mut out = std::collections::HashMap::with_capacity(user_ids.len());
        if user_ids.is_empty() {
            return Ok(out);
        }

        let placeholders = user_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            r#"SELECT user_id, ff_threshold, dte_pairs, vol_point, min_open_interest, min_volume,
       max_bid_ask_pct, sigma_fwd_floor, stability_scans, cooldown_minutes,
       quiet_hours_enabled, quiet_hours_start, quiet_hours_end, timezone
FROM user_policies WHERE user_id IN ({placeholders});"#
        );
        let mut q = sqlx::query(&query);
        for user_id in user_ids {
            q = q.bind(user_id.to_string());
        }
        let rows = q.fetch_all(&self.pool).await?;

        for r in rows {
            let raw_id: String = r.get("user_id");
            let user_id = match Uuid::parse_str(&raw_id) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed user_policies row");
                    continue;
                }
            };
            match row_to_policy(&r) {
                Ok(policy) => {
                    out.insert(user_id, policy);
                }
                Err(e) => tracing::warn!(error = %e, "skipping malformed user_policies row"),
            }
        }
        Ok(out)
    }

    async fn deactivate_user(&self, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE subscriptions SET active = 0 WHERE user_id = ?;")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_ticker(r: &sqlx::any::AnyRow) -> anyhow::Result<Ticker> {
    let tier = Tier::parse(&r.get::<String, _>("tier")).ok_or_else(|| anyhow!("unrecognized tier"))?;
    let last_scan_at: Option<i64> = r.try_get("last_scan_at").ok();
    Ok(Ticker {
        symbol: r.get("symbol"),
        active_subscriber_count: r.get("active_subscriber_count"),
        last_scan_at: last_scan_at.map(|v| v as u64),
        tier,
    })
}

fn row_to_policy(r: &sqlx::any::AnyRow) -> anyhow::Result<UserPolicy> {
    let dte_pairs: Vec<DtePairRule> =
        serde_json::from_str(&r.get::<String, _>("dte_pairs")).context("invalid dte_pairs json")?;
    let vol_point =
        VolPoint::parse(&r.get::<String, _>("vol_point")).ok_or_else(|| anyhow!("unrecognized vol_point"))?;
    let timezone = UserPolicy::parse_timezone(&r.get::<String, _>("timezone"))?;
    let quiet_hours_start = NaiveTime::parse_from_str(&r.get::<String, _>("quiet_hours_start"), "%H:%M")
        .context("invalid quiet_hours_start")?;
    let quiet_hours_end = NaiveTime::parse_from_str(&r.get::<String, _>("quiet_hours_end"), "%H:%M")
        .context("invalid quiet_hours_end")?;

    Ok(UserPolicy {
        ff_threshold: r.get("ff_threshold"),
        dte_pairs,
        vol_point,
        min_open_interest: r.get("min_open_interest"),
        min_volume: r.get("min_volume"),
        max_bid_ask_pct: r.get("max_bid_ask_pct"),
        sigma_fwd_floor: r.get("sigma_fwd_floor"),
        stability_scans: i64_to_u32(r.get("stability_scans"))?,
        cooldown_minutes: r.get("cooldown_minutes"),
        quiet_hours: QuietHours {
            enabled: r.get("quiet_hours_enabled"),
            start: quiet_hours_start,
            end: quiet_hours_end,
        },
        timezone,
    })
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}

fn i64_to_u32(v: i64) -> anyhow::Result<u32> {
    u32::try_from(v).map_err(|_| anyhow!("i64 out of u32 range: {v}"))
}
