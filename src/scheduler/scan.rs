use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::metrics::counters::Counters;
use crate::model::ticker::Tier;
use crate::queue::{EnqueueOutcome, JobQueue, ScanJob};
use crate::store::Directory;

/// Per-tier cadence in milliseconds (§4.2).
#[derive(Clone, Copy, Debug)]
pub struct TierCadence {
    pub high_ms: u64,
    pub medium_ms: u64,
    pub low_ms: u64,
}

impl TierCadence {
    pub fn for_tier(&self, tier: Tier) -> u64 {
        match tier {
            Tier::High => self.high_ms,
            Tier::Medium => self.medium_ms,
            Tier::Low => self.low_ms,
        }
    }
}

/// Iterates tickers each tick and enqueues `(ticker, scan_bucket)` jobs,
/// deduped per `(ticker, bucket)` and backpressured by skipping rather
/// than stacking when the job queue is saturated (§4.2).
pub struct ScanScheduler<Q, D> {
    queue: Arc<Q>,
    directory: Arc<D>,
    cadence: TierCadence,
    counters: Counters,
}

impl<Q, D> ScanScheduler<Q, D>
where
    Q: JobQueue,
    D: Directory,
{
    pub fn new(queue: Arc<Q>, directory: Arc<D>, cadence: TierCadence, counters: Counters) -> Self {
        Self { queue, directory, cadence, counters }
    }

    /// Runs one tick: enqueues a scan job for every active ticker whose
    /// `scan_bucket = floor(now_ms / cadence)` hasn't been claimed yet.
    #[instrument(skip(self), target = "scheduler", level = "debug")]
    pub async fn on_tick(&self, now_ms: u64) -> anyhow::Result<()> {
        let tickers = self.directory.active_tickers().await?;
        debug!(count = tickers.len(), "scan tick scanning active tickers");

        for ticker in tickers {
            let cadence_ms = self.cadence.for_tier(ticker.tier);
            let bucket = (now_ms / cadence_ms) as i64;
            let job = ScanJob { ticker: ticker.symbol.clone(), bucket };

            match self.queue.enqueue_scan(job, cadence_ms, now_ms).await {
                Ok(EnqueueOutcome::Enqueued) => {
                    self.counters.scan_buckets_enqueued.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(EnqueueOutcome::Deduped) => {
                    self.counters.scan_buckets_deduped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(EnqueueOutcome::Dropped) => {
                    self.counters.scan_buckets_backpressure_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    warn!(ticker = %ticker.symbol, bucket, "scan job queue saturated, dropping scan");
                }
                Err(e) => {
                    warn!(ticker = %ticker.symbol, error = %e, "enqueueing scan job failed");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ticker::Ticker;
    use crate::queue::memory::InMemoryJobQueue;
    use crate::store::directory::memory::InMemoryDirectory;

    fn cadence() -> TierCadence {
        TierCadence { high_ms: 180_000, medium_ms: 900_000, low_ms: 3_600_000 }
    }

    #[tokio::test]
    async fn enqueues_once_per_ticker_per_bucket() {
        let queue = Arc::new(InMemoryJobQueue::new(10));
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_ticker(Ticker {
            symbol: "SPY".to_string(),
            active_subscriber_count: 1,
            last_scan_at: None,
            tier: Tier::High,
        });

        let scheduler = ScanScheduler::new(queue.clone(), directory, cadence(), Counters::default());
        scheduler.on_tick(0).await.unwrap();
        scheduler.on_tick(1_000).await.unwrap();

        let first = queue.dequeue_scan(std::time::Duration::from_millis(10)).await.unwrap();
        let second = queue.dequeue_scan(std::time::Duration::from_millis(10)).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn bucket_rollover_reenqueues() {
        let queue = Arc::new(InMemoryJobQueue::new(10));
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_ticker(Ticker {
            symbol: "SPY".to_string(),
            active_subscriber_count: 1,
            last_scan_at: None,
            tier: Tier::High,
        });

        let scheduler = ScanScheduler::new(queue.clone(), directory, cadence(), Counters::default());
        scheduler.on_tick(0).await.unwrap();
        scheduler.on_tick(180_001).await.unwrap();

        let first = queue.dequeue_scan(std::time::Duration::from_millis(10)).await.unwrap();
        let second = queue.dequeue_scan(std::time::Duration::from_millis(10)).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_some());
    }
}
