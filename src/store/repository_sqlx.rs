use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::model::decision::{Decision, DecisionKind};
use crate::model::policy::VolPoint;
use crate::model::signal::Signal;
use crate::store::repository::{DecisionExtras, SignalStore};
use crate::time::now_ms;

/// SQLx-backed implementation of `SignalStore`. Responsible only for
/// persistence and row mapping.
pub struct SqlxSignalStore {
    pool: AnyPool,
}

impl SqlxSignalStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalStore for SqlxSignalStore {
    async fn create(&self, mut signal: Signal) -> anyhow::Result<Option<Signal>> {
        signal.signal_id = Uuid::new_v4();

        let res = sqlx::query(
            r#"
INSERT INTO signals
  (signal_id, ticker, as_of_ts, front_expiry, back_expiry, front_dte, back_dte,
   front_iv, back_iv, sigma_fwd, ff_value, vol_point, quality_score, reason_codes, dedupe_key)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(signal.signal_id.to_string())
        .bind(&signal.ticker)
        .bind(u64_to_i64(signal.as_of_ts)?)
        .bind(signal.front_expiry.to_string())
        .bind(signal.back_expiry.to_string())
        .bind(signal.front_dte)
        .bind(signal.back_dte)
        .bind(signal.front_iv)
        .bind(signal.back_iv)
        .bind(signal.sigma_fwd)
        .bind(signal.ff_value)
        .bind(signal.vol_point.as_str())
        .bind(signal.quality_score)
        .bind(serde_json::to_string(&signal.reason_codes)?)
        .bind(&signal.dedupe_key)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(Some(signal)),
            // Duplicate dedupe_key: the unique constraint, not a prior
            // SELECT, makes this race-free.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, signal_id: Uuid) -> anyhow::Result<Option<Signal>> {
        let row = sqlx::query(
            r#"
SELECT signal_id, ticker, as_of_ts, front_expiry, back_expiry, front_dte, back_dte,
       front_iv, back_iv, sigma_fwd, ff_value, vol_point, quality_score, reason_codes, dedupe_key
FROM signals
WHERE signal_id = ?;
"#,
        )
        .bind(signal_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_signal(&r)).transpose()
    }

    async fn record_decision(
        &self,
        signal_id: Uuid,
        user_id: Uuid,
        kind: DecisionKind,
        extras: DecisionExtras,
    ) -> anyhow::Result<Decision> {
        let decision_id = Uuid::new_v4();
        let ts = now_ms();

        sqlx::query(
            r#"
INSERT INTO decisions (decision_id, signal_id, user_id, kind, ts, entry_price, exit_price, pnl, notes)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(signal_id, user_id) DO UPDATE SET
  kind = excluded.kind,
  ts = excluded.ts,
  entry_price = excluded.entry_price,
  exit_price = excluded.exit_price,
  pnl = excluded.pnl,
  notes = excluded.notes;
"#,
        )
        .bind(decision_id.to_string())
        .bind(signal_id.to_string())
        .bind(user_id.to_string())
        .bind(kind.as_str())
        .bind(u64_to_i64(ts)?)
        .bind(extras.entry_price)
        .bind(extras.exit_price)
        .bind(extras.pnl)
        .bind(&extras.notes)
        .execute(&self.pool)
        .await?;

        Ok(Decision {
            signal_id,
            user_id,
            kind,
            ts,
            entry_price: extras.entry_price,
            exit_price: extras.exit_price,
            pnl: extras.pnl,
            notes: extras.notes,
        })
    }

    async fn recent_signals(
        &self,
        user_id: Uuid,
        ticker: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<Signal>> {
        let rows = match ticker {
            Some(t) => {
                sqlx::query(
                    r#"
SELECT s.signal_id, s.ticker, s.as_of_ts, s.front_expiry, s.back_expiry, s.front_dte, s.back_dte,
       s.front_iv, s.back_iv, s.sigma_fwd, s.ff_value, s.vol_point, s.quality_score, s.reason_codes, s.dedupe_key
FROM signals s
JOIN subscriptions sub ON sub.ticker = s.ticker AND sub.user_id = ? AND sub.active = 1
WHERE s.ticker = ?
ORDER BY s.as_of_ts DESC
LIMIT ?;
"#,
                )
                .bind(user_id.to_string())
                .bind(t)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
SELECT s.signal_id, s.ticker, s.as_of_ts, s.front_expiry, s.back_expiry, s.front_dte, s.back_dte,
       s.front_iv, s.back_iv, s.sigma_fwd, s.ff_value, s.vol_point, s.quality_score, s.reason_codes, s.dedupe_key
FROM signals s
JOIN subscriptions sub ON sub.ticker = s.ticker AND sub.user_id = ? AND sub.active = 1
ORDER BY s.as_of_ts DESC
LIMIT ?;
"#,
                )
                .bind(user_id.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut out = Vec::new();
        for r in rows {
            match row_to_signal(&r) {
                Ok(s) => out.push(s),
                Err(e) => tracing::warn!(error = %e, "skipping malformed signal row"),
            }
        }
        Ok(out)
    }

    async fn history(&self, user_id: Uuid, limit: usize) -> anyhow::Result<Vec<(Signal, Option<Decision>)>> {
        let rows = sqlx::query(
            r#"
SELECT s.signal_id, s.ticker, s.as_of_ts, s.front_expiry, s.back_expiry, s.front_dte, s.back_dte,
       s.front_iv, s.back_iv, s.sigma_fwd, s.ff_value, s.vol_point, s.quality_score, s.reason_codes, s.dedupe_key,
       d.kind AS d_kind, d.ts AS d_ts, d.entry_price AS d_entry_price, d.exit_price AS d_exit_price,
       d.pnl AS d_pnl, d.notes AS d_notes
FROM signals s
JOIN subscriptions sub ON sub.ticker = s.ticker AND sub.user_id = ? AND sub.active = 1
LEFT JOIN decisions d ON d.signal_id = s.signal_id AND d.user_id = ?
ORDER BY s.as_of_ts DESC
LIMIT ?;
"#,
        )
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for r in rows {
            let signal = match row_to_signal(&r) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed signal row");
                    continue;
                }
            };
            let decision = row_to_optional_decision(&r, signal.signal_id, user_id)?;
            out.push((signal, decision));
        }
        Ok(out)
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_signal(r: &sqlx::any::AnyRow) -> anyhow::Result<Signal> {
    let signal_id = Uuid::parse_str(&r.get::<String, _>("signal_id")).context("invalid signal_id")?;
    let vol_point = VolPoint::parse(&r.get::<String, _>("vol_point"))
        .ok_or_else(|| anyhow!("unrecognized vol_point"))?;
    let reason_codes: Vec<String> = serde_json::from_str(&r.get::<String, _>("reason_codes"))
        .context("invalid reason_codes json")?;

    Ok(Signal {
        signal_id,
        ticker: r.get("ticker"),
        as_of_ts: i64_to_u64(r.get("as_of_ts"))?,
        front_expiry: parse_date(&r.get::<String, _>("front_expiry"))?,
        back_expiry: parse_date(&r.get::<String, _>("back_expiry"))?,
        front_dte: r.get("front_dte"),
        back_dte: r.get("back_dte"),
        front_iv: r.get("front_iv"),
        back_iv: r.get("back_iv"),
        sigma_fwd: r.get("sigma_fwd"),
        ff_value: r.get("ff_value"),
        vol_point,
        quality_score: r.get("quality_score"),
        reason_codes,
        dedupe_key: r.get("dedupe_key"),
    })
}

fn row_to_optional_decision(
    r: &sqlx::any::AnyRow,
    signal_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<Decision>> {
    let kind: Option<String> = r.try_get("d_kind").ok();
    let Some(kind) = kind else {
        return Ok(None);
    };
    let kind = DecisionKind::parse(&kind).ok_or_else(|| anyhow!("unrecognized decision kind"))?;
    let ts = i64_to_u64(r.try_get("d_ts")?)?;

    Ok(Some(Decision {
        signal_id,
        user_id,
        kind,
        ts,
        entry_price: r.try_get("d_entry_price").ok(),
        exit_price: r.try_get("d_exit_price").ok(),
        pnl: r.try_get("d_pnl").ok(),
        notes: r.try_get("d_notes").ok(),
    }))
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").context("invalid date column")
}

fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    if v < 0 {
        return Err(anyhow!("negative i64 where u64 expected: {v}"));
    }
    Ok(v as u64)
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}
