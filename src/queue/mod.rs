pub mod memory;
pub mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScanJob {
    pub ticker: String,
    pub bucket: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NotificationJob {
    pub signal_id: Uuid,
    pub user_id: Uuid,
}

/// Result of a scan-job enqueue attempt (§4.2, §9 "Scan-bucket dedup").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// Another scheduler already enqueued `(ticker, bucket)` this window.
    Deduped,
    /// Worker pool saturated; the scheduler skips rather than stacks.
    Dropped,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues `(ticker, bucket)` unless it was already enqueued this
    /// bucket (dedup) or the queue is at capacity (backpressure). `now_ms`
    /// is threaded through explicitly rather than read from a clock, so
    /// callers can drive deterministic virtual-time tests.
    async fn enqueue_scan(
        &self,
        job: ScanJob,
        cadence_ms: u64,
        now_ms: u64,
    ) -> anyhow::Result<EnqueueOutcome>;

    /// Blocking dequeue with timeout; `None` on timeout, not an error.
    async fn dequeue_scan(&self, timeout: Duration) -> anyhow::Result<Option<ScanJob>>;
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: NotificationJob) -> anyhow::Result<()>;

    /// Blocking dequeue with timeout; `None` on timeout, not an error.
    async fn dequeue(&self, timeout: Duration) -> anyhow::Result<Option<NotificationJob>>;
}
