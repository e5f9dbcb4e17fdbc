use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::queue::{EnqueueOutcome, JobQueue, NotificationJob, NotificationQueue, ScanJob};

fn encode_scan_job(job: &ScanJob) -> String {
    format!("{}\u{1}{}", job.ticker, job.bucket)
}

fn decode_scan_job(raw: &str) -> Option<ScanJob> {
    let mut parts = raw.splitn(2, '\u{1}');
    let ticker = parts.next()?.to_string();
    let bucket = parts.next()?.parse().ok()?;
    Some(ScanJob { ticker, bucket })
}

fn encode_notification_job(job: &NotificationJob) -> String {
    format!("{}\u{1}{}", job.signal_id, job.user_id)
}

fn decode_notification_job(raw: &str) -> Option<NotificationJob> {
    let mut parts = raw.splitn(2, '\u{1}');
    let signal_id = parts.next()?.parse().ok()?;
    let user_id = parts.next()?.parse().ok()?;
    Some(NotificationJob { signal_id, user_id })
}

/// Redis-backed scan job queue. The dedup set (`SET NX EX cadence`) makes
/// scan-bucket dedup safe across multiple scheduler instances (§4.2, §9);
/// the job list is a plain `LIST` dequeued with `BRPOP`.
pub struct RedisJobQueue {
    conn: ConnectionManager,
    list_key: String,
    capacity: usize,
}

impl RedisJobQueue {
    pub async fn connect(url: &str, list_key: impl Into<String>, capacity: usize) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid cache url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("connecting to cache")?;
        Ok(Self {
            conn,
            list_key: list_key.into(),
            capacity,
        })
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue_scan(
        &self,
        job: ScanJob,
        cadence_ms: u64,
        _now_ms: u64,
    ) -> anyhow::Result<EnqueueOutcome> {
        let mut conn = self.conn.clone();
        let dedup_key = format!("scanbucket|{}|{}", job.ticker, job.bucket);
        let cadence_secs = (cadence_ms / 1000).max(1);

        let claimed: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(cadence_secs)
            .query_async(&mut conn)
            .await
            .context("scan-bucket dedup SET failed")?;

        if claimed.is_none() {
            return Ok(EnqueueOutcome::Deduped);
        }

        let len: usize = conn.llen(&self.list_key).await.context("LLEN failed")?;
        if len >= self.capacity {
            tracing::warn!(ticker = %job.ticker, bucket = job.bucket, "scan job queue saturated, dropping scan");
            return Ok(EnqueueOutcome::Dropped);
        }

        conn.lpush::<_, _, ()>(&self.list_key, encode_scan_job(&job))
            .await
            .context("LPUSH failed")?;
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn dequeue_scan(&self, timeout: Duration) -> anyhow::Result<Option<ScanJob>> {
        let mut conn = self.conn.clone();
        let secs = timeout.as_secs_f64().max(0.01);
        let result: Option<(String, String)> =
            conn.brpop(&self.list_key, secs).await.context("BRPOP failed")?;
        Ok(result.and_then(|(_, payload)| decode_scan_job(&payload)))
    }
}

/// Redis-backed notification queue: a single `LIST`, FIFO globally and
/// therefore FIFO for any one user's subsequence of it (§4.6, §5).
pub struct RedisNotificationQueue {
    conn: ConnectionManager,
    list_key: String,
}

impl RedisNotificationQueue {
    pub async fn connect(url: &str, list_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid cache url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("connecting to cache")?;
        Ok(Self {
            conn,
            list_key: list_key.into(),
        })
    }
}

#[async_trait]
impl NotificationQueue for RedisNotificationQueue {
    async fn enqueue(&self, job: NotificationJob) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.list_key, encode_notification_job(&job))
            .await
            .context("LPUSH failed")?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> anyhow::Result<Option<NotificationJob>> {
        let mut conn = self.conn.clone();
        let secs = timeout.as_secs_f64().max(0.01);
        let result: Option<(String, String)> =
            conn.brpop(&self.list_key, secs).await.context("BRPOP failed")?;
        Ok(result.and_then(|(_, payload)| decode_notification_job(&payload)))
    }
}
