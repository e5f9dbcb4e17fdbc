use async_trait::async_trait;
use uuid::Uuid;

use crate::model::decision::DecisionKind;
use crate::model::signal::Signal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessengerErrorKind {
    Transient,
    Permanent,
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("messenger error ({kind:?}): {message}")]
pub struct MessengerError {
    pub kind: MessengerErrorKind,
    pub message: String,
}

impl MessengerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: MessengerErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: MessengerErrorKind::Permanent,
            message: message.into(),
        }
    }
}

/// Notification payload presented to the recipient, with the inline
/// `{Place, Ignore}` actions (§4.7).
#[derive(Clone, Debug)]
pub struct NotificationPayload {
    pub signal: Signal,
}

/// Delivered inline-action callback, translated by the router into a
/// `record_decision` call (§4.7).
#[derive(Clone, Copy, Debug)]
pub struct MessengerCallback {
    pub user_chat_id: Uuid,
    pub signal_id: Uuid,
    pub action: DecisionKind,
}

/// Capability abstraction with one live implementation (the chat platform)
/// and a fake for tests (§9 "Polymorphism needs").
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(
        &self,
        user_chat_id: Uuid,
        payload: NotificationPayload,
    ) -> Result<Uuid, MessengerError>;
}

/// Placeholder production `Messenger`: logs what would be sent instead of
/// reaching the chat platform, since the chat-bot command surface is an
/// external collaborator out of this core's scope (§1 Non-goals). Swap
/// for a real chat-platform client without touching the router.
#[derive(Clone, Copy, Default)]
pub struct LoggingMessenger;

#[async_trait]
impl Messenger for LoggingMessenger {
    async fn send(
        &self,
        user_chat_id: Uuid,
        payload: NotificationPayload,
    ) -> Result<Uuid, MessengerError> {
        tracing::info!(
            user_chat_id = %user_chat_id,
            signal_id = %payload.signal.signal_id,
            ticker = %payload.signal.ticker,
            ff_value = payload.signal.ff_value,
            "would send notification"
        );
        Ok(Uuid::new_v4())
    }
}

pub mod fake {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    /// Replay-style fake: queues results per chat id, records every send.
    #[derive(Default)]
    pub struct FakeMessenger {
        queued: Mutex<HashMap<Uuid, Vec<Result<Uuid, MessengerError>>>>,
        sent: Mutex<Vec<(Uuid, Uuid)>>,
    }

    impl FakeMessenger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, user_chat_id: Uuid, result: Result<Uuid, MessengerError>) {
            self.queued.lock().entry(user_chat_id).or_default().push(result);
        }

        pub fn sent(&self) -> Vec<(Uuid, Uuid)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn send(
            &self,
            user_chat_id: Uuid,
            payload: NotificationPayload,
        ) -> Result<Uuid, MessengerError> {
            self.sent.lock().push((user_chat_id, payload.signal.signal_id));
            let mut queued = self.queued.lock();
            let queue = queued.entry(user_chat_id).or_default();
            if queue.is_empty() {
                return Ok(Uuid::new_v4());
            }
            queue.remove(0)
        }
    }
}
