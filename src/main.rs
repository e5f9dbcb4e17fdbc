use std::sync::Arc;
use std::time::Duration;

use forward_factor_core::{
    config::AppConfig,
    db::Db,
    health,
    logger::init_tracing,
    metrics::counters::Counters,
    notifier::{LoggingMessenger, NotificationRouter},
    provider::cache::RedisSnapshotCache,
    provider::http_provider::HttpChainProvider,
    queue::redis_queue::{RedisJobQueue, RedisNotificationQueue},
    scheduler::scan::{ScanScheduler, TierCadence},
    store::{SqlxDirectory, SqlxSignalStore},
    time::now_ms,
    tracker::redis_tracker::RedisStabilityTracker,
    worker::ScanWorker,
};

/// Starts the fixed-cadence scheduler tick loop. Each tick re-reads active
/// tickers from the directory and enqueues scan jobs for whichever
/// `(ticker, bucket)` pairs haven't been claimed yet.
fn start_scheduler_loop(
    scheduler: Arc<ScanScheduler<RedisJobQueue, SqlxDirectory>>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = scheduler.on_tick(now_ms()).await {
                tracing::error!(error = %e, "scheduler tick failed");
            }
        }
    });
}

/// Starts `count` scan workers, each running the FETCH→COMPUTE→TRACK→
/// PERSIST→NOTIFY loop against the shared job queue.
#[allow(clippy::too_many_arguments)]
fn start_scan_workers(
    worker: Arc<
        ScanWorker<
            HttpChainProvider,
            RedisSnapshotCache,
            SqlxDirectory,
            SqlxSignalStore,
            RedisStabilityTracker,
            RedisJobQueue,
            RedisNotificationQueue,
        >,
    >,
    count: usize,
    cadence_ms: u64,
    heartbeat: health::Heartbeat,
) {
    for _ in 0..count {
        let worker = worker.clone();
        let heartbeat = heartbeat.clone();
        tokio::spawn(async move {
            worker
                .run_worker_loop(Duration::from_secs(1), cadence_ms, &heartbeat)
                .await;
        });
    }
}

/// Starts `count` notification router workers draining the shared
/// notification queue. Per-user dispatch stays FIFO regardless of how many
/// workers are running.
fn start_notification_workers(
    router: Arc<NotificationRouter<RedisNotificationQueue, SqlxSignalStore, SqlxDirectory, LoggingMessenger>>,
    count: usize,
) {
    for _ in 0..count {
        let router = router.clone();
        tokio::spawn(async move {
            router.run_worker_loop(Duration::from_secs(1)).await;
        });
    }
}

/// Periodically logs the aggregate health report (§6): cache reachable, DB
/// reachable, and at least one worker heartbeat fresh within the scan
/// cadence window.
fn start_health_loop(
    db: Arc<sqlx::AnyPool>,
    cache: redis::aio::ConnectionManager,
    heartbeat: health::Heartbeat,
    cadence_ms: u64,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let report = health::check(&db, &cache, &heartbeat, cadence_ms, now_ms()).await;
            if !report.healthy() {
                tracing::warn!(?report, "health check degraded");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting forward-factor scanner...");

    let cfg = AppConfig::from_env();

    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let directory = Arc::new(SqlxDirectory::new((*db.pool).clone()));
    let store = Arc::new(SqlxSignalStore::new((*db.pool).clone()));
    let tracker = Arc::new(RedisStabilityTracker::connect(&cfg.cache_url).await?);

    let job_queue = Arc::new(
        RedisJobQueue::connect(&cfg.cache_url, "scan_jobs", cfg.scan_job_queue_capacity).await?,
    );
    let notification_queue =
        Arc::new(RedisNotificationQueue::connect(&cfg.cache_url, "notification_jobs").await?);
    let snapshot_cache = Arc::new(RedisSnapshotCache::connect(&cfg.cache_url).await?);

    let provider = Arc::new(HttpChainProvider::new(
        cfg.provider_base_url.clone(),
        &cfg.provider_api_key,
        Duration::from_millis(cfg.provider_timeout_ms),
    )?);
    let messenger = Arc::new(LoggingMessenger);

    let counters = Counters::default();
    let heartbeat = health::Heartbeat::new();

    let cadence = TierCadence {
        high_ms: cfg.cadence_high_ms,
        medium_ms: cfg.cadence_medium_ms,
        low_ms: cfg.cadence_low_ms,
    };

    let scheduler = Arc::new(ScanScheduler::new(
        job_queue.clone(),
        directory.clone(),
        cadence,
        counters.clone(),
    ));
    start_scheduler_loop(scheduler, Duration::from_secs(15));

    let worker = Arc::new(ScanWorker::new(
        provider,
        snapshot_cache,
        directory.clone(),
        store.clone(),
        tracker,
        job_queue,
        notification_queue.clone(),
        counters.clone(),
        cfg.provider_max_retries,
    ));
    start_scan_workers(worker, cfg.scan_worker_count, cfg.cadence_high_ms, heartbeat.clone());

    let router = Arc::new(NotificationRouter::new(
        notification_queue,
        store,
        directory,
        messenger,
        counters,
        cfg.messenger_max_retries,
    ));
    start_notification_workers(router, cfg.notification_worker_concurrency);

    start_health_loop(db.pool.clone(), db_cache_conn(&cfg).await?, heartbeat, cfg.cadence_high_ms);

    tracing::info!("Scanner started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    Ok(())
}

async fn db_cache_conn(cfg: &AppConfig) -> anyhow::Result<redis::aio::ConnectionManager> {
    let client = redis::Client::open(cfg.cache_url.as_str())?;
    Ok(client.get_connection_manager().await?)
}
