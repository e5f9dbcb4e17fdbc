use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::decision::{Decision, DecisionKind};
use crate::model::signal::Signal;
use crate::store::repository::{DecisionExtras, SignalStore};
use crate::time::now_ms;

/// In-memory `SignalStore` for tests, mirroring the teacher's
/// `MockSessionRepository`. Subscriptions are supplied directly rather
/// than joined from a `subscriptions` table.
#[derive(Default)]
pub struct InMemorySignalStore {
    signals: Mutex<HashMap<Uuid, Signal>>,
    dedupe_keys: Mutex<HashMap<String, Uuid>>,
    decisions: Mutex<HashMap<(Uuid, Uuid), Decision>>,
    subscriptions: Mutex<HashMap<Uuid, Vec<String>>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: Uuid, ticker: &str) {
        self.subscriptions.lock().entry(user_id).or_default().push(ticker.to_string());
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn create(&self, mut signal: Signal) -> anyhow::Result<Option<Signal>> {
        let mut dedupe_keys = self.dedupe_keys.lock();
        if dedupe_keys.contains_key(&signal.dedupe_key) {
            return Ok(None);
        }
        signal.signal_id = Uuid::new_v4();
        dedupe_keys.insert(signal.dedupe_key.clone(), signal.signal_id);
        self.signals.lock().insert(signal.signal_id, signal.clone());
        Ok(Some(signal))
    }

    async fn get(&self, signal_id: Uuid) -> anyhow::Result<Option<Signal>> {
        Ok(self.signals.lock().get(&signal_id).cloned())
    }

    async fn record_decision(
        &self,
        signal_id: Uuid,
        user_id: Uuid,
        kind: DecisionKind,
        extras: DecisionExtras,
    ) -> anyhow::Result<Decision> {
        let decision = Decision {
            signal_id,
            user_id,
            kind,
            ts: now_ms(),
            entry_price: extras.entry_price,
            exit_price: extras.exit_price,
            pnl: extras.pnl,
            notes: extras.notes,
        };
        self.decisions.lock().insert((signal_id, user_id), decision.clone());
        Ok(decision)
    }

    async fn recent_signals(
        &self,
        user_id: Uuid,
        ticker: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<Signal>> {
        let subscribed = self.subscriptions.lock().get(&user_id).cloned().unwrap_or_default();
        let mut signals: Vec<Signal> = self
            .signals
            .lock()
            .values()
            .filter(|s| subscribed.iter().any(|t| t == &s.ticker))
            .filter(|s| ticker.is_none_or(|t| t == s.ticker))
            .cloned()
            .collect();
        signals.sort_by(|a, b| b.as_of_ts.cmp(&a.as_of_ts));
        signals.truncate(limit);
        Ok(signals)
    }

    async fn history(&self, user_id: Uuid, limit: usize) -> anyhow::Result<Vec<(Signal, Option<Decision>)>> {
        let signals = self.recent_signals(user_id, None, limit).await?;
        let decisions = self.decisions.lock();
        Ok(signals
            .into_iter()
            .map(|s| {
                let decision = decisions.get(&(s.signal_id, user_id)).cloned();
                (s, decision)
            })
            .collect())
    }
}
