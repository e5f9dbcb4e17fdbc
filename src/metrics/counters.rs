use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal counters for operational visibility, sized to the pipeline's
/// own stages.
#[derive(Clone, Default)]
pub struct Counters {
    pub fetch_ok: Arc<AtomicU64>,
    pub fetch_transient_fail: Arc<AtomicU64>,
    pub fetch_permanent_fail: Arc<AtomicU64>,
    pub fetch_rate_limited: Arc<AtomicU64>,

    pub signals_emitted: Arc<AtomicU64>,
    pub signals_duplicate: Arc<AtomicU64>,

    pub tracker_first_scan: Arc<AtomicU64>,
    pub tracker_needs_stability: Arc<AtomicU64>,
    pub tracker_cooldown: Arc<AtomicU64>,
    pub tracker_delta_too_small: Arc<AtomicU64>,
    pub tracker_below_threshold: Arc<AtomicU64>,
    pub tracker_ok: Arc<AtomicU64>,
    pub tracker_conflict: Arc<AtomicU64>,

    pub notifications_sent: Arc<AtomicU64>,
    pub notifications_dropped_quiet_hours: Arc<AtomicU64>,
    pub notifications_dropped_threshold: Arc<AtomicU64>,
    pub notifications_dropped_permanent: Arc<AtomicU64>,

    pub scan_buckets_enqueued: Arc<AtomicU64>,
    pub scan_buckets_deduped: Arc<AtomicU64>,
    pub scan_buckets_backpressure_dropped: Arc<AtomicU64>,
}
