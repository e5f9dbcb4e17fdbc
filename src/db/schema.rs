use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS tickers (
  symbol TEXT PRIMARY KEY,
  active_subscriber_count INTEGER NOT NULL,
  last_scan_at BIGINT,
  tier TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS subscriptions (
  user_id TEXT NOT NULL,
  ticker TEXT NOT NULL,
  active BOOLEAN NOT NULL,
  added_at BIGINT NOT NULL,
  PRIMARY KEY (user_id, ticker)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS user_policies (
  user_id TEXT PRIMARY KEY,
  ff_threshold DOUBLE PRECISION NOT NULL,
  dte_pairs TEXT NOT NULL,
  vol_point TEXT NOT NULL,
  min_open_interest INTEGER NOT NULL,
  min_volume INTEGER NOT NULL,
  max_bid_ask_pct DOUBLE PRECISION NOT NULL,
  sigma_fwd_floor DOUBLE PRECISION NOT NULL,
  stability_scans INTEGER NOT NULL,
  cooldown_minutes INTEGER NOT NULL,
  quiet_hours_enabled BOOLEAN NOT NULL,
  quiet_hours_start TEXT NOT NULL,
  quiet_hours_end TEXT NOT NULL,
  timezone TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS signals (
  signal_id TEXT PRIMARY KEY,
  ticker TEXT NOT NULL,
  as_of_ts BIGINT NOT NULL,
  front_expiry TEXT NOT NULL,
  back_expiry TEXT NOT NULL,
  front_dte INTEGER NOT NULL,
  back_dte INTEGER NOT NULL,
  front_iv DOUBLE PRECISION NOT NULL,
  back_iv DOUBLE PRECISION NOT NULL,
  sigma_fwd DOUBLE PRECISION NOT NULL,
  ff_value DOUBLE PRECISION NOT NULL,
  vol_point TEXT NOT NULL,
  quality_score DOUBLE PRECISION NOT NULL,
  reason_codes TEXT NOT NULL,
  dedupe_key TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS decisions (
  decision_id TEXT PRIMARY KEY,
  signal_id TEXT NOT NULL,
  user_id TEXT NOT NULL,
  kind TEXT NOT NULL,
  ts BIGINT NOT NULL,
  entry_price DOUBLE PRECISION,
  exit_price DOUBLE PRECISION,
  pnl DOUBLE PRECISION,
  notes TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS uq_signals_dedupe_key ON signals(dedupe_key);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_subscriptions_ticker ON subscriptions(ticker);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS uq_decisions_signal_user ON decisions(signal_id, user_id);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_decisions_user_signal ON decisions(user_id, signal_id);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
