use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::model::chain::ChainSnapshot;
use crate::provider::{ChainProvider, ProviderError};

/// Replay provider for tests: a queue of canned results per ticker,
/// consumed in order. Mirrors `MockSessionRepository`'s queued-response
/// style rather than reimplementing HTTP semantics.
#[derive(Default)]
pub struct ReplayChainProvider {
    queues: Mutex<HashMap<String, Vec<Result<ChainSnapshot, ProviderError>>>>,
}

impl ReplayChainProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a result to the back of `ticker`'s queue; consumed FIFO.
    pub fn push(&self, ticker: &str, result: Result<ChainSnapshot, ProviderError>) {
        self.queues.lock().entry(ticker.to_string()).or_default().push(result);
    }

    pub fn push_snapshot(&self, snapshot: ChainSnapshot) {
        let ticker = snapshot.ticker.clone();
        self.push(&ticker, Ok(snapshot));
    }

    pub fn push_error(&self, ticker: &str, error: ProviderError) {
        self.push(ticker, Err(error));
    }
}

#[async_trait]
impl ChainProvider for ReplayChainProvider {
    async fn get_chain_snapshot(&self, ticker: &str) -> Result<ChainSnapshot, ProviderError> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(ticker)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ProviderError::permanent(format!("no replay data queued for {ticker}")))?;
        queue.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot(ticker: &str) -> ChainSnapshot {
        ChainSnapshot {
            ticker: ticker.to_string(),
            as_of_ts: 0,
            underlying_price: 100.0,
            expiries: vec![crate::model::chain::Expiry {
                expiry_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                contracts: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn replays_in_fifo_order() {
        let provider = ReplayChainProvider::new();
        provider.push_snapshot(snapshot("SPY"));
        provider.push_error("SPY", ProviderError::transient("boom"));

        let first = provider.get_chain_snapshot("SPY").await;
        assert!(first.is_ok());
        let second = provider.get_chain_snapshot("SPY").await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn empty_queue_is_a_permanent_error() {
        let provider = ReplayChainProvider::new();
        let result = provider.get_chain_snapshot("QQQ").await;
        assert!(result.is_err());
    }
}
