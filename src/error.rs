use thiserror::Error;

use crate::engine::RejectReason;

/// Typed errors at the core's leaf boundaries (engine, tracker, store,
/// provider, messenger). Orchestration code (worker, scheduler, router
/// loops) wraps these in `anyhow::Result` the way the teacher's
/// `Scheduler`/`SessionStore` do, adding context at each hop.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("provider transient failure: {0}")]
    ProviderTransient(String),

    #[error("provider permanent failure: {0}")]
    ProviderPermanent(String),

    #[error("provider rate limited, retry after {retry_after_ms}ms")]
    ProviderRateLimited { retry_after_ms: u64 },

    #[error("engine rejected candidate: {0:?}")]
    EngineReject(RejectReason),

    #[error("signal store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("stability tracker conflict after {attempts} attempts")]
    TrackerConflict { attempts: u32 },

    #[error("messenger transient failure: {0}")]
    MessengerTransient(String),

    #[error("messenger permanent failure: {0}")]
    MessengerPermanent(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}
