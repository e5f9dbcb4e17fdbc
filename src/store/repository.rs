use async_trait::async_trait;
use uuid::Uuid;

use crate::model::decision::{Decision, DecisionKind};
use crate::model::signal::Signal;

/// Optional fields recorded alongside a decision (§3 Decision).
#[derive(Clone, Debug, Default)]
pub struct DecisionExtras {
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub notes: Option<String>,
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Inserts `signal`, assigning it a fresh id. Returns `None` on a
    /// `dedupe_key` unique-constraint violation — the constraint, not a
    /// prior `SELECT`, is what makes this race-free (§4.5).
    async fn create(&self, signal: Signal) -> anyhow::Result<Option<Signal>>;

    /// Fetches a signal by id, used by the notification router to reload
    /// the signal a queued `(signal_id, user_id)` job refers to.
    async fn get(&self, signal_id: Uuid) -> anyhow::Result<Option<Signal>>;

    /// Upsert keyed by (signal_id, user_id); re-recording overwrites.
    async fn record_decision(
        &self,
        signal_id: Uuid,
        user_id: Uuid,
        kind: DecisionKind,
        extras: DecisionExtras,
    ) -> anyhow::Result<Decision>;

    /// Signals for tickers `user_id` actively subscribes to, newest first.
    async fn recent_signals(
        &self,
        user_id: Uuid,
        ticker: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<Signal>>;

    /// (signal, decision?) pairs, newest first.
    async fn history(&self, user_id: Uuid, limit: usize) -> anyhow::Result<Vec<(Signal, Option<Decision>)>>;
}
