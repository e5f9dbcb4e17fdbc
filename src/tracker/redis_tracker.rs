use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use redis::Script;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::model::policy::{DELTA_FF_MIN, UserPolicy};
use crate::tracker::{CheckOutcome, CheckReason, STATE_TTL_SECS, StabilityTracker, tracker_key};

/// Mirrors `tracker::decide` exactly, executed server-side so the
/// read-modify-write is atomic under Redis's single-threaded script
/// execution (§9 "Concurrent mutable state": do not approximate with a
/// non-atomic get/set).
const CHECK_SCRIPT: &str = r#"
local key = KEYS[1]
local ff = tonumber(ARGV[1])
local ff_threshold = tonumber(ARGV[2])
local stability_scans = tonumber(ARGV[3])
local cooldown_secs = tonumber(ARGV[4])
local delta_ff_min = tonumber(ARGV[5])
local now_secs = tonumber(ARGV[6])
local now_ms = ARGV[7]
local ttl = tonumber(ARGV[8])

if redis.call('EXISTS', key) == 0 then
  redis.call('HSET', key, 'last_ff', ff, 'consecutive_above', 1, 'last_alert_ts', '', 'last_alert_ff', '')
  redis.call('EXPIRE', key, ttl)
  return {0, 'first_scan'}
end

local consecutive_above = tonumber(redis.call('HGET', key, 'consecutive_above'))
local last_alert_ts_raw = redis.call('HGET', key, 'last_alert_ts')
local last_alert_ff_raw = redis.call('HGET', key, 'last_alert_ff')

if ff >= ff_threshold then
  consecutive_above = consecutive_above + 1
  redis.call('HSET', key, 'last_ff', ff, 'consecutive_above', consecutive_above)
  redis.call('EXPIRE', key, ttl)

  if consecutive_above < stability_scans then
    return {0, 'needs_stability'}
  end

  if last_alert_ts_raw and last_alert_ts_raw ~= '' then
    local last_alert_ts = tonumber(last_alert_ts_raw)
    if (now_secs - last_alert_ts) < cooldown_secs then
      return {0, 'cooldown'}
    end
  end

  if last_alert_ff_raw and last_alert_ff_raw ~= '' then
    local last_alert_ff = tonumber(last_alert_ff_raw)
    if (ff - last_alert_ff) < delta_ff_min then
      return {0, 'delta_too_small'}
    end
  end

  redis.call('HSET', key, 'last_alert_ts', now_secs, 'last_alert_ff', ff)
  redis.call('EXPIRE', key, ttl)
  return {1, 'ok'}
else
  redis.call('HSET', key, 'last_ff', ff, 'consecutive_above', 0)
  redis.call('EXPIRE', key, ttl)
  return {0, 'below_threshold'}
end
"#;

pub struct RedisStabilityTracker {
    conn: ConnectionManager,
    script: Script,
}

impl RedisStabilityTracker {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid cache url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("connecting to cache")?;
        Ok(Self {
            conn,
            script: Script::new(CHECK_SCRIPT),
        })
    }
}

#[async_trait]
impl StabilityTracker for RedisStabilityTracker {
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
        let cooldown_secs = (policy.cooldown_minutes.max(0) as u64) * 60;
        let now_secs = now_ms / 1000;

        let mut conn = self.conn.clone();
        let (should_alert, reason): (i64, String) = self
            .script
            .key(key)
            .arg(ff)
            .arg(policy.ff_threshold)
            .arg(policy.stability_scans)
            .arg(cooldown_secs)
            .arg(DELTA_FF_MIN)
            .arg(now_secs)
            .arg(now_ms)
            .arg(STATE_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .context("stability tracker script failed")?;

        let reason = CheckReason::parse(&reason)
            .ok_or_else(|| anyhow::anyhow!("tracker script returned unrecognized reason: {reason}"))?;

        Ok(CheckOutcome {
            should_alert: should_alert != 0,
            reason,
        })
    }
}
