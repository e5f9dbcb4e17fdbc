use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::engine;
use crate::metrics::counters::Counters;
use crate::model::chain::ChainSnapshot;
use crate::provider::cache::SnapshotCache;
use crate::provider::{ChainProvider, ProviderError, ProviderErrorKind};
use crate::queue::{JobQueue, NotificationJob, NotificationQueue, ScanJob};
use crate::store::{Directory, SignalStore};
use crate::time::now_ms;
use crate::tracker::StabilityTracker;

/// Runs the per-job **FETCH → COMPUTE → TRACK → PERSIST → NOTIFY → DONE**
/// state machine (§4.3). Per-subscriber work is independent: one
/// subscriber's engine/tracker/store failure never blocks another's.
pub struct ScanWorker<P, C, D, S, T, Q, NQ> {
    provider: Arc<P>,
    cache: Arc<C>,
    directory: Arc<D>,
    store: Arc<S>,
    tracker: Arc<T>,
    job_queue: Arc<Q>,
    notification_queue: Arc<NQ>,
    counters: Counters,
    provider_max_retries: u32,
}

impl<P, C, D, S, T, Q, NQ> ScanWorker<P, C, D, S, T, Q, NQ>
where
    P: ChainProvider,
    C: SnapshotCache,
    D: Directory,
    S: SignalStore,
    T: StabilityTracker,
    Q: JobQueue,
    NQ: NotificationQueue,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<P>,
        cache: Arc<C>,
        directory: Arc<D>,
        store: Arc<S>,
        tracker: Arc<T>,
        job_queue: Arc<Q>,
        notification_queue: Arc<NQ>,
        counters: Counters,
        provider_max_retries: u32,
    ) -> Self {
        Self {
            provider,
            cache,
            directory,
            store,
            tracker,
            job_queue,
            notification_queue,
            counters,
            provider_max_retries,
        }
    }

    /// Pulls jobs from the queue until `dequeue_scan` is interrupted by the
    /// caller's cancellation (mirrors the teacher's run-to-shutdown loops:
    /// finish the in-flight job, then stop).
    pub async fn run_worker_loop(&self, poll_timeout: Duration, cadence_ms: u64, heartbeat: &crate::health::Heartbeat) {
        loop {
            heartbeat.beat(now_ms());
            match self.job_queue.dequeue_scan(poll_timeout).await {
                Ok(Some(job)) => self.process_job(job, cadence_ms).await,
                Ok(None) => continue,
                Err(e) => warn!(error = %e, "scan job dequeue failed"),
            }
        }
    }

    #[instrument(skip(self), fields(ticker = %job.ticker, bucket = job.bucket), level = "debug")]
    async fn process_job(&self, job: ScanJob, cadence_ms: u64) {
        let snapshot = match self.fetch(&job.ticker, job.bucket, cadence_ms).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "FETCH aborted scan job");
                return;
            }
        };

        self.compute_track_persist_notify(&job.ticker, &snapshot).await;

        if let Err(e) = self.directory.set_last_scan_at(&job.ticker, now_ms()).await {
            warn!(error = %e, "updating last_scan_at failed");
        }
    }

    /// FETCH: cache first, provider on miss, retry transient failures with
    /// exponential backoff honouring `Retry-After` (§4.3 step 1).
    async fn fetch(&self, ticker: &str, bucket: i64, cadence_ms: u64) -> anyhow::Result<ChainSnapshot> {
        if let Some(cached) = self.cache.get(ticker, bucket).await? {
            return Ok(cached);
        }

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(250);
        loop {
            match self.provider.get_chain_snapshot(ticker).await {
                Ok(snapshot) => {
                    self.counters.fetch_ok.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    self.cache.put(ticker, bucket, &snapshot, cadence_ms).await?;
                    return Ok(snapshot);
                }
                Err(ProviderError { kind: ProviderErrorKind::Permanent, message, .. }) => {
                    self.counters.fetch_permanent_fail.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    anyhow::bail!("provider permanent failure: {message}");
                }
                Err(ProviderError { kind: ProviderErrorKind::RateLimited, retry_after_ms, .. }) => {
                    self.counters.fetch_rate_limited.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    attempt += 1;
                    if attempt > self.provider_max_retries {
                        anyhow::bail!("provider rate limited past retry budget");
                    }
                    tokio::time::sleep(Duration::from_millis(retry_after_ms.unwrap_or(1_000))).await;
                }
                Err(ProviderError { kind: ProviderErrorKind::Transient, message, .. }) => {
                    self.counters.fetch_transient_fail.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    attempt += 1;
                    if attempt > self.provider_max_retries {
                        anyhow::bail!("provider transient failure past retry budget: {message}");
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    /// COMPUTE → TRACK → PERSIST → NOTIFY, fanned out per subscriber. Each
    /// subscriber's pipeline runs independently of the others' failures
    /// (§4.3 "Failure semantics").
    async fn compute_track_persist_notify(&self, ticker: &str, snapshot: &ChainSnapshot) {
        let subscribers = match self.directory.subscribers(ticker).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "loading subscribers failed");
                return;
            }
        };
        if subscribers.is_empty() {
            return;
        }

        let policies = match self.directory.get_policies(&subscribers).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "batched policy read failed");
                return;
            }
        };

        for user_id in subscribers {
            let Some(policy) = policies.get(&user_id) else {
                debug!(%user_id, "no policy on file, skipping subscriber");
                continue;
            };

            for signal in engine::compute(snapshot, policy) {
                let outcome = match self
                    .tracker
                    .check(ticker, signal.front_expiry, signal.back_expiry, user_id, signal.ff_value, policy, now_ms())
                    .await
                {
                    Ok(o) => o,
                    Err(e) => {
                        warn!(%user_id, error = %e, "stability tracker check failed");
                        continue;
                    }
                };
                self.record_tracker_outcome(&outcome.reason);

                let created = match self.store.create(signal.clone()).await {
                    Ok(Some(s)) => {
                        self.counters.signals_emitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        Some(s)
                    }
                    Ok(None) => {
                        self.counters.signals_duplicate.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        None
                    }
                    Err(e) => {
                        warn!(%user_id, error = %e, "persisting signal failed");
                        None
                    }
                };

                if outcome.should_alert {
                    let Some(persisted) = created else { continue };
                    if let Err(e) = self
                        .notification_queue
                        .enqueue(NotificationJob { signal_id: persisted.signal_id, user_id })
                        .await
                    {
                        warn!(%user_id, error = %e, "enqueueing notification failed");
                    }
                }
            }
        }
    }

    fn record_tracker_outcome(&self, reason: &crate::tracker::CheckReason) {
        use crate::tracker::CheckReason::*;
        use std::sync::atomic::Ordering::Relaxed;
        match reason {
            FirstScan => self.counters.tracker_first_scan.fetch_add(1, Relaxed),
            NeedsStability => self.counters.tracker_needs_stability.fetch_add(1, Relaxed),
            Cooldown => self.counters.tracker_cooldown.fetch_add(1, Relaxed),
            DeltaTooSmall => self.counters.tracker_delta_too_small.fetch_add(1, Relaxed),
            Ok => self.counters.tracker_ok.fetch_add(1, Relaxed),
            BelowThreshold => self.counters.tracker_below_threshold.fetch_add(1, Relaxed),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::chain::{Contract, Expiry, Right};
    use crate::model::policy::UserPolicy;
    use crate::model::ticker::Ticker;
    use crate::provider::cache::memory::InMemorySnapshotCache;
    use crate::provider::replay::ReplayChainProvider;
    use crate::queue::memory::{InMemoryJobQueue, InMemoryNotificationQueue};
    use crate::store::directory::memory::InMemoryDirectory;
    use crate::store::memory::InMemorySignalStore;
    use crate::tracker::memory::InMemoryStabilityTracker;
    use chrono::NaiveDate;

    fn snapshot_with_calendar(ticker: &str, as_of: NaiveDate) -> ChainSnapshot {
        let front = Expiry {
            expiry_date: as_of + chrono::Duration::days(30),
            contracts: vec![Contract {
                strike: 100.0,
                right: Right::Call,
                bid: Some(9.9),
                ask: Some(10.1),
                iv: Some(0.30),
                delta: Some(0.5),
                volume: 500,
                open_interest: 1000,
            }],
        };
        let back = Expiry {
            expiry_date: as_of + chrono::Duration::days(60),
            contracts: vec![Contract {
                strike: 100.0,
                right: Right::Call,
                bid: Some(9.4),
                ask: Some(9.6),
                iv: Some(0.22),
                delta: Some(0.5),
                volume: 500,
                open_interest: 1000,
            }],
        };
        ChainSnapshot {
            ticker: ticker.to_string(),
            as_of_ts: as_of.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis() as u64,
            underlying_price: 100.0,
            expiries: vec![front, back],
        }
    }

    #[tokio::test]
    async fn happy_path_fetch_compute_persist_notify() {
        let as_of = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let provider = Arc::new(ReplayChainProvider::new());
        provider.push_snapshot(snapshot_with_calendar("SPY", as_of));

        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_ticker(Ticker {
            symbol: "SPY".to_string(),
            active_subscriber_count: 1,
            last_scan_at: None,
            tier: crate::model::ticker::Tier::High,
        });
        let user = uuid::Uuid::new_v4();
        let mut policy = UserPolicy::default();
        policy.ff_threshold = 0.0;
        policy.stability_scans = 1;
        directory.add_subscriber("SPY", user, policy.clone());

        // §4.4 step 1: a key with no prior state always returns
        // `first_scan` with no alert, regardless of `stability_scans`.
        // Seed the tracker with that first scan directly so the single
        // `process_job` call below is the confirming scan that alerts,
        // rather than needing a real duplicate scan through PERSIST.
        let tracker = Arc::new(InMemoryStabilityTracker::new());
        tracker
            .check(
                "SPY",
                as_of + chrono::Duration::days(30),
                as_of + chrono::Duration::days(60),
                user,
                0.0,
                &policy,
                0,
            )
            .await
            .unwrap();

        let worker = ScanWorker::new(
            provider,
            Arc::new(InMemorySnapshotCache::new()),
            directory,
            Arc::new(InMemorySignalStore::new()),
            tracker,
            Arc::new(InMemoryJobQueue::new(10)),
            Arc::new(InMemoryNotificationQueue::new()),
            Counters::default(),
            3,
        );

        worker.process_job(ScanJob { ticker: "SPY".to_string(), bucket: 0 }, 180_000).await;

        let sent = worker.notification_queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert!(sent.is_some());
    }

    #[tokio::test]
    async fn no_subscribers_is_a_noop() {
        let provider = Arc::new(ReplayChainProvider::new());
        provider.push_snapshot(snapshot_with_calendar("SPY", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_ticker(Ticker {
            symbol: "SPY".to_string(),
            active_subscriber_count: 0,
            last_scan_at: None,
            tier: crate::model::ticker::Tier::Low,
        });

        let worker = ScanWorker::new(
            provider,
            Arc::new(InMemorySnapshotCache::new()),
            directory,
            Arc::new(InMemorySignalStore::new()),
            Arc::new(InMemoryStabilityTracker::new()),
            Arc::new(InMemoryJobQueue::new(10)),
            Arc::new(InMemoryNotificationQueue::new()),
            Counters::default(),
            3,
        );

        worker.process_job(ScanJob { ticker: "SPY".to_string(), bucket: 0 }, 180_000).await;
    }
}
