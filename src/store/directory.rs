use async_trait::async_trait;
use uuid::Uuid;

use crate::model::policy::UserPolicy;
use crate::model::ticker::{Ticker, Tier};

/// Read/write access to the `tickers`, `subscriptions`, and `user_policies`
/// tables (§6 persisted state layout). Kept separate from `SignalStore`
/// since the scheduler, worker pool, and router each need only a slice of
/// this surface and none of them touch `signals`/`decisions` directly
/// through it.
#[async_trait]
pub trait Directory: Send + Sync {
    /// All tickers with at least one active subscriber, for the scheduler
    /// to tier and enqueue.
    async fn active_tickers(&self) -> anyhow::Result<Vec<Ticker>>;

    async fn get_ticker(&self, symbol: &str) -> anyhow::Result<Option<Ticker>>;

    async fn set_ticker_tier(&self, ticker: &str, tier: Tier) -> anyhow::Result<()>;

    async fn set_last_scan_at(&self, ticker: &str, at_ms: u64) -> anyhow::Result<()>;

    /// Active subscriber ids for `ticker`, for the worker's fan-out step.
    async fn subscribers(&self, ticker: &str) -> anyhow::Result<Vec<Uuid>>;

    async fn get_policy(&self, user_id: Uuid) -> anyhow::Result<Option<UserPolicy>>;

    /// Batched policy read for the worker's COMPUTE step (§4.3 "load active
    /// subscribers for ticker and their policies in one batched read").
    /// The default fans out to `get_policy`; `SqlxDirectory` overrides this
    /// with a single `IN (...)` query to avoid N+1.
    async fn get_policies(&self, user_ids: &[Uuid]) -> anyhow::Result<std::collections::HashMap<Uuid, UserPolicy>> {
        let mut out = std::collections::HashMap::with_capacity(user_ids.len());
        for &user_id in user_ids {
            if let Some(policy) = self.get_policy(user_id).await? {
                out.insert(user_id, policy);
            }
        }
        Ok(out)
    }

    /// Deactivates all of `user_id`'s subscriptions after a permanent
    /// messenger failure (§4.6 step 4: "mark the user inactive and drop").
    async fn deactivate_user(&self, user_id: Uuid) -> anyhow::Result<()>;
}

pub mod memory {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    /// In-memory `Directory` for tests.
    #[derive(Default)]
    pub struct InMemoryDirectory {
        tickers: Mutex<HashMap<String, Ticker>>,
        subscribers: Mutex<HashMap<String, Vec<Uuid>>>,
        policies: Mutex<HashMap<Uuid, UserPolicy>>,
    }

    impl InMemoryDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_ticker(&self, ticker: Ticker) {
            self.tickers.lock().insert(ticker.symbol.clone(), ticker);
        }

        pub fn add_subscriber(&self, ticker: &str, user_id: Uuid, policy: UserPolicy) {
            self.subscribers.lock().entry(ticker.to_string()).or_default().push(user_id);
            self.policies.lock().insert(user_id, policy);
        }
    }

    #[async_trait]
    impl Directory for InMemoryDirectory {
        async fn active_tickers(&self) -> anyhow::Result<Vec<Ticker>> {
            Ok(self.tickers.lock().values().cloned().collect())
        }

        async fn get_ticker(&self, symbol: &str) -> anyhow::Result<Option<Ticker>> {
            Ok(self.tickers.lock().get(symbol).cloned())
        }

        async fn set_ticker_tier(&self, ticker: &str, tier: Tier) -> anyhow::Result<()> {
            if let Some(t) = self.tickers.lock().get_mut(ticker) {
                t.tier = tier;
            }
            Ok(())
        }

        async fn set_last_scan_at(&self, ticker: &str, at_ms: u64) -> anyhow::Result<()> {
            if let Some(t) = self.tickers.lock().get_mut(ticker) {
                t.last_scan_at = Some(at_ms);
            }
            Ok(())
        }

        async fn subscribers(&self, ticker: &str) -> anyhow::Result<Vec<Uuid>> {
            Ok(self.subscribers.lock().get(ticker).cloned().unwrap_or_default())
        }

        async fn get_policy(&self, user_id: Uuid) -> anyhow::Result<Option<UserPolicy>> {
            Ok(self.policies.lock().get(&user_id).cloned())
        }

        async fn deactivate_user(&self, user_id: Uuid) -> anyhow::Result<()> {
            for subs in self.subscribers.lock().values_mut() {
                subs.retain(|id| *id != user_id);
            }
            Ok(())
        }
    }
}
