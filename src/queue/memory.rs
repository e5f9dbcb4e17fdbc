use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::queue::{EnqueueOutcome, JobQueue, NotificationJob, NotificationQueue, ScanJob};

/// In-memory job queue used by tests; production uses `redis_queue`. Mirrors
/// the teacher's bounded-channel backpressure model but adds scan-bucket
/// dedup, which a plain channel can't express.
pub struct InMemoryJobQueue {
    capacity: usize,
    queue: Mutex<VecDeque<ScanJob>>,
    dedup: Mutex<HashMap<String, u64>>,
    notify: Notify,
}

impl InMemoryJobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::new()),
            dedup: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    fn dedup_key(job: &ScanJob) -> String {
        format!("{}|{}", job.ticker, job.bucket)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue_scan(
        &self,
        job: ScanJob,
        cadence_ms: u64,
        now_ms: u64,
    ) -> anyhow::Result<EnqueueOutcome> {
        let key = Self::dedup_key(&job);
        {
            let mut dedup = self.dedup.lock();
            if let Some(expires_at) = dedup.get(&key) {
                if now_ms < *expires_at {
                    return Ok(EnqueueOutcome::Deduped);
                }
            }
            dedup.insert(key, now_ms.saturating_add(cadence_ms));
        }

        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            tracing::warn!(ticker = %job.ticker, bucket = job.bucket, "scan job queue saturated, dropping scan");
            return Ok(EnqueueOutcome::Dropped);
        }
        queue.push_back(job);
        drop(queue);
        self.notify.notify_one();
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn dequeue_scan(&self, timeout: Duration) -> anyhow::Result<Option<ScanJob>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.queue.lock().pop_front() {
                return Ok(Some(job));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }
}

/// In-memory notification queue. A single FIFO list preserves per-user
/// order as a subsequence of global order; the router enforces the
/// single-in-flight-per-user constraint on top (§4.6, §5).
pub struct InMemoryNotificationQueue {
    queue: Mutex<VecDeque<NotificationJob>>,
    notify: Notify,
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }
}

impl Default for InMemoryNotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationQueue for InMemoryNotificationQueue {
    async fn enqueue(&self, job: NotificationJob) -> anyhow::Result<()> {
        self.queue.lock().push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> anyhow::Result<Option<NotificationJob>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.queue.lock().pop_front() {
                return Ok(Some(job));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dedups_same_ticker_bucket_within_cadence() {
        let q = InMemoryJobQueue::new(10);
        let job = ScanJob {
            ticker: "SPY".to_string(),
            bucket: 1,
        };
        let first = q.enqueue_scan(job.clone(), 180_000, 0).await.unwrap();
        let second = q.enqueue_scan(job.clone(), 180_000, 1_000).await.unwrap();
        assert_eq!(first, EnqueueOutcome::Enqueued);
        assert_eq!(second, EnqueueOutcome::Deduped);
    }

    #[tokio::test]
    async fn bucket_rollover_allows_reenqueue() {
        let q = InMemoryJobQueue::new(10);
        let job = ScanJob {
            ticker: "SPY".to_string(),
            bucket: 1,
        };
        q.enqueue_scan(job.clone(), 180_000, 0).await.unwrap();
        let after_rollover = q.enqueue_scan(job, 180_000, 180_001).await.unwrap();
        assert_eq!(after_rollover, EnqueueOutcome::Enqueued);
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure_by_dropping() {
        let q = InMemoryJobQueue::new(1);
        let a = ScanJob {
            ticker: "SPY".to_string(),
            bucket: 1,
        };
        let b = ScanJob {
            ticker: "QQQ".to_string(),
            bucket: 1,
        };
        assert_eq!(q.enqueue_scan(a, 180_000, 0).await.unwrap(), EnqueueOutcome::Enqueued);
        assert_eq!(q.enqueue_scan(b, 180_000, 0).await.unwrap(), EnqueueOutcome::Dropped);
    }

    #[tokio::test]
    async fn dequeue_times_out_when_empty() {
        let q = InMemoryJobQueue::new(10);
        let out = q.dequeue_scan(Duration::from_millis(20)).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn notification_queue_is_fifo() {
        let q = InMemoryNotificationQueue::new();
        let j1 = NotificationJob {
            signal_id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
        };
        let j2 = NotificationJob {
            signal_id: uuid::Uuid::new_v4(),
            user_id: j1.user_id,
        };
        q.enqueue(j1).await.unwrap();
        q.enqueue(j2).await.unwrap();

        let first = q.dequeue(Duration::from_millis(20)).await.unwrap().unwrap();
        let second = q.dequeue(Duration::from_millis(20)).await.unwrap().unwrap();
        assert_eq!(first.signal_id, j1.signal_id);
        assert_eq!(second.signal_id, j2.signal_id);
    }
}
