pub mod cache;
pub mod http_provider;
pub mod replay;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::chain::ChainSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Transient,
    Permanent,
    RateLimited,
}

/// Failures surface as `{kind, http_status?, retry_after?}` (§6).
#[derive(Error, Debug, Clone)]
#[error("provider error ({kind:?}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub http_status: Option<u16>,
    pub retry_after_ms: Option<u64>,
    pub message: String,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            http_status: None,
            retry_after_ms: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Permanent,
            http_status: None,
            retry_after_ms: None,
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            http_status: Some(429),
            retry_after_ms: Some(retry_after_ms),
            message: "rate limited".to_string(),
        }
    }
}

/// Narrow capability abstraction (§9 "Polymorphism needs"): one live HTTP
/// implementation in production, a replay/fake in tests.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn get_chain_snapshot(&self, ticker: &str) -> Result<ChainSnapshot, ProviderError>;
}
