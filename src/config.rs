use crate::model::policy::UserPolicy;

#[derive(Clone)]
pub struct AppConfig {
    /// Relational store DSN. Postgres in production, SQLite for tests/dev,
    /// both reached through `sqlx::Any` as the teacher does.
    pub database_url: String,

    /// Redis URL backing the stability tracker and the job/notification
    /// queues.
    pub cache_url: String,

    /// Credentials for the two external collaborators. Never logged — see
    /// the hand-rolled `Debug` impl below.
    pub provider_api_key: String,
    pub messenger_token: String,

    /// Base URL of the chain-data provider's HTTP API.
    pub provider_base_url: String,

    // =========================
    // Scheduler configuration
    // =========================
    /// Tier cadences in milliseconds. A ticker in a given tier is enqueued
    /// at most once per `floor(now / cadence)` bucket.
    pub cadence_high_ms: u64,
    pub cadence_medium_ms: u64,
    pub cadence_low_ms: u64,

    // =========================
    // Worker pool configuration
    // =========================
    /// Number of scan workers running the FETCH→COMPUTE→TRACK→PERSIST→NOTIFY
    /// state machine concurrently.
    pub scan_worker_count: usize,

    /// Capacity of the scan job queue between scheduler and worker pool.
    /// Acts as backpressure: a full queue means the scheduler skips rather
    /// than stacks scans for the current bucket.
    pub scan_job_queue_capacity: usize,

    /// Cross-user parallelism bound for the notification router. Per-user
    /// dispatch stays FIFO regardless of this value.
    pub notification_worker_concurrency: usize,

    // =========================
    // Timeouts (§5 timeout table)
    // =========================
    pub provider_timeout_ms: u64,
    pub cache_timeout_ms: u64,
    pub db_timeout_ms: u64,
    pub messenger_timeout_ms: u64,

    // =========================
    // Retry bounds
    // =========================
    pub provider_max_retries: u32,
    pub messenger_max_retries: u32,

    /// Fallback policy fields applied when a user has not customized a
    /// value.
    pub default_policy: UserPolicy,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<redacted>")
            .field("cache_url", &"<redacted>")
            .field("provider_api_key", &"<redacted>")
            .field("messenger_token", &"<redacted>")
            .field("provider_base_url", &self.provider_base_url)
            .field("cadence_high_ms", &self.cadence_high_ms)
            .field("cadence_medium_ms", &self.cadence_medium_ms)
            .field("cadence_low_ms", &self.cadence_low_ms)
            .field("scan_worker_count", &self.scan_worker_count)
            .field("scan_job_queue_capacity", &self.scan_job_queue_capacity)
            .field(
                "notification_worker_concurrency",
                &self.notification_worker_concurrency,
            )
            .field("default_policy", &self.default_policy)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://forward_factor_dev.db".to_string());
        let cache_url =
            std::env::var("CACHE_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let provider_api_key = std::env::var("PROVIDER_API_KEY").unwrap_or_default();
        let messenger_token = std::env::var("MESSENGER_TOKEN").unwrap_or_default();
        let provider_base_url = std::env::var("PROVIDER_BASE_URL")
            .unwrap_or_else(|_| "https://api.example-provider.test".to_string());

        Self {
            database_url,
            cache_url,
            provider_api_key,
            messenger_token,
            provider_base_url,

            // Cadence defaults per §4.2.
            cadence_high_ms: 180_000,
            cadence_medium_ms: 900_000,
            cadence_low_ms: 3_600_000,

            scan_worker_count: 8,
            scan_job_queue_capacity: 512,
            notification_worker_concurrency: 16,

            // Timeout defaults per §5.
            provider_timeout_ms: 10_000,
            cache_timeout_ms: 1_000,
            db_timeout_ms: 5_000,
            messenger_timeout_ms: 15_000,

            provider_max_retries: 3,
            messenger_max_retries: 3,

            default_policy: UserPolicy::default(),
        }
    }
}
