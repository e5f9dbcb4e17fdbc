use async_trait::async_trait;
use chrono::NaiveDate;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::model::chain::{ChainSnapshot, Contract, Expiry, Right};

/// Chain-snapshot cache: last-writer-wins, keyed by `(ticker, scan-bucket)`
/// (§3, §5 "Shared resources"). FETCH consults this before calling the
/// provider, so concurrent subscribers of the same ticker within the same
/// bucket share one provider round-trip.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, ticker: &str, bucket: i64) -> anyhow::Result<Option<ChainSnapshot>>;
    async fn put(&self, ticker: &str, bucket: i64, snapshot: &ChainSnapshot, ttl_ms: u64) -> anyhow::Result<()>;
}

#[derive(Serialize, Deserialize)]
struct CachedSnapshot {
    ticker: String,
    as_of_ts: u64,
    underlying_price: f64,
    expiries: Vec<CachedExpiry>,
}

#[derive(Serialize, Deserialize)]
struct CachedExpiry {
    expiry_date: NaiveDate,
    contracts: Vec<CachedContract>,
}

#[derive(Serialize, Deserialize)]
struct CachedContract {
    strike: f64,
    right: bool, // true = call
    bid: Option<f64>,
    ask: Option<f64>,
    iv: Option<f64>,
    delta: Option<f64>,
    volume: i64,
    open_interest: i64,
}

impl From<&ChainSnapshot> for CachedSnapshot {
    fn from(s: &ChainSnapshot) -> Self {
        Self {
            ticker: s.ticker.clone(),
            as_of_ts: s.as_of_ts,
            underlying_price: s.underlying_price,
            expiries: s
                .expiries
                .iter()
                .map(|e| CachedExpiry {
                    expiry_date: e.expiry_date,
                    contracts: e
                        .contracts
                        .iter()
                        .map(|c| CachedContract {
                            strike: c.strike,
                            right: matches!(c.right, Right::Call),
                            bid: c.bid,
                            ask: c.ask,
                            iv: c.iv,
                            delta: c.delta,
                            volume: c.volume,
                            open_interest: c.open_interest,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl From<CachedSnapshot> for ChainSnapshot {
    fn from(c: CachedSnapshot) -> Self {
        ChainSnapshot {
            ticker: c.ticker,
            as_of_ts: c.as_of_ts,
            underlying_price: c.underlying_price,
            expiries: c
                .expiries
                .into_iter()
                .map(|e| Expiry {
                    expiry_date: e.expiry_date,
                    contracts: e
                        .contracts
                        .into_iter()
                        .map(|c| Contract {
                            strike: c.strike,
                            right: if c.right { Right::Call } else { Right::Put },
                            bid: c.bid,
                            ask: c.ask,
                            iv: c.iv,
                            delta: c.delta,
                            volume: c.volume,
                            open_interest: c.open_interest,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

pub struct RedisSnapshotCache {
    conn: ConnectionManager,
}

impl RedisSnapshotCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn key(ticker: &str, bucket: i64) -> String {
        format!("chainsnapshot|{ticker}|{bucket}")
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get(&self, ticker: &str, bucket: i64) -> anyhow::Result<Option<ChainSnapshot>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(ticker, bucket)).await?;
        match raw {
            Some(raw) => {
                let cached: CachedSnapshot = serde_json::from_str(&raw)?;
                Ok(Some(cached.into()))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, ticker: &str, bucket: i64, snapshot: &ChainSnapshot, ttl_ms: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let cached = CachedSnapshot::from(snapshot);
        let raw = serde_json::to_string(&cached)?;
        let ttl_secs = (ttl_ms / 1000).max(1);
        conn.set_ex::<_, _, ()>(Self::key(ticker, bucket), raw, ttl_secs).await?;
        Ok(())
    }
}

pub mod memory {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemorySnapshotCache {
        entries: Mutex<HashMap<(String, i64), (ChainSnapshot, u64)>>,
    }

    impl InMemorySnapshotCache {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl SnapshotCache for InMemorySnapshotCache {
        async fn get(&self, ticker: &str, bucket: i64) -> anyhow::Result<Option<ChainSnapshot>> {
            Ok(self.entries.lock().get(&(ticker.to_string(), bucket)).map(|(s, _)| s.clone()))
        }

        async fn put(&self, ticker: &str, bucket: i64, snapshot: &ChainSnapshot, ttl_ms: u64) -> anyhow::Result<()> {
            self.entries
                .lock()
                .insert((ticker.to_string(), bucket), (snapshot.clone(), ttl_ms));
            Ok(())
        }
    }
}
