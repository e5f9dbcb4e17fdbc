use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::metrics::counters::Counters;
use crate::model::decision::DecisionKind;
use crate::notifier::messenger::{Messenger, MessengerError, MessengerErrorKind, NotificationPayload};
use crate::queue::{NotificationJob, NotificationQueue};
use crate::store::{Directory, DecisionExtras, SignalStore};

/// Why a notification never reached the messenger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    SignalMissing,
    PolicyMissing,
    QuietHours,
    BelowThreshold,
    PermanentMessengerFailure,
}

/// Dequeues `(signal_id, user_id)`, applies the quiet-hours and threshold
/// gates, and dispatches to the messenger (§4.6). Per-user dispatch is
/// serialized with a per-user lock; cross-user dispatch runs on however
/// many worker tasks `run` is given.
pub struct NotificationRouter<Q, S, D, M> {
    queue: Arc<Q>,
    store: Arc<S>,
    directory: Arc<D>,
    messenger: Arc<M>,
    counters: Counters,
    messenger_max_retries: u32,
    per_user_locks: SyncMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl<Q, S, D, M> NotificationRouter<Q, S, D, M>
where
    Q: NotificationQueue,
    S: SignalStore,
    D: Directory,
    M: Messenger,
{
    pub fn new(
        queue: Arc<Q>,
        store: Arc<S>,
        directory: Arc<D>,
        messenger: Arc<M>,
        counters: Counters,
        messenger_max_retries: u32,
    ) -> Self {
        Self {
            queue,
            store,
            directory,
            messenger,
            counters,
            messenger_max_retries,
            per_user_locks: SyncMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, user_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.per_user_locks.lock().entry(user_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Runs one worker loop, pulling jobs until `dequeue` returns `None`
    /// on every poll it is asked to stop on (callers drive shutdown via
    /// their own cancellation, matching the worker pool's drain style).
    pub async fn run_worker_loop(&self, poll_timeout: Duration) {
        loop {
            match self.queue.dequeue(poll_timeout).await {
                Ok(Some(job)) => self.dispatch(job).await,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "notification dequeue failed");
                }
            }
        }
    }

    async fn dispatch(&self, job: NotificationJob) {
        let lock = self.lock_for(job.user_id);
        let _guard = lock.lock().await;
        if let Err(reason) = self.process_one(job).await {
            tracing::info!(?reason, user_id = %job.user_id, signal_id = %job.signal_id, "notification dropped");
        }
    }

    async fn process_one(&self, job: NotificationJob) -> Result<(), DropReason> {
        let signal = self
            .store
            .get(job.signal_id)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "loading signal for notification failed");
                DropReason::SignalMissing
            })?
            .ok_or(DropReason::SignalMissing)?;

        let policy = self
            .directory
            .get_policy(job.user_id)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "loading policy for notification failed");
                DropReason::PolicyMissing
            })?
            .ok_or(DropReason::PolicyMissing)?;

        let now_utc = Utc::now();
        let local = now_utc.with_timezone(&policy.timezone);
        if policy.quiet_hours.contains(local.time()) {
            self.counters.notifications_dropped_quiet_hours.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Err(DropReason::QuietHours);
        }

        if signal.ff_value < policy.ff_threshold {
            self.counters.notifications_dropped_threshold.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Err(DropReason::BelowThreshold);
        }

        let payload = NotificationPayload { signal };
        match self.send_with_retry(job.user_id, payload).await {
            Ok(()) => {
                self.counters.notifications_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            }
            Err(()) => {
                self.counters.notifications_dropped_permanent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if let Err(e) = self.directory.deactivate_user(job.user_id).await {
                    tracing::warn!(error = %e, "deactivating user after permanent messenger failure failed");
                }
                Err(DropReason::PermanentMessengerFailure)
            }
        }
    }

    async fn send_with_retry(&self, user_chat_id: Uuid, payload: NotificationPayload) -> Result<(), ()> {
        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(200);
        loop {
            match self.messenger.send(user_chat_id, payload.clone()).await {
                Ok(_message_id) => return Ok(()),
                Err(MessengerError { kind: MessengerErrorKind::Permanent, message }) => {
                    tracing::warn!(user_chat_id = %user_chat_id, message, "permanent messenger failure");
                    return Err(());
                }
                Err(MessengerError { kind: MessengerErrorKind::Transient, message }) => {
                    attempt += 1;
                    if attempt > self.messenger_max_retries {
                        tracing::warn!(user_chat_id = %user_chat_id, message, "exhausted messenger retries");
                        return Err(());
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

/// Translates a messenger callback into a `record_decision` call (§4.7).
pub async fn handle_callback<S: SignalStore>(
    store: &S,
    user_chat_id: Uuid,
    signal_id: Uuid,
    action: DecisionKind,
) -> anyhow::Result<()> {
    store
        .record_decision(signal_id, user_chat_id, action, DecisionExtras::default())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::policy::{QuietHours, UserPolicy};
    use crate::model::signal::Signal;
    use crate::notifier::messenger::fake::FakeMessenger;
    use crate::queue::memory::InMemoryNotificationQueue;
    use crate::store::directory::memory::InMemoryDirectory;
    use crate::store::memory::InMemorySignalStore;
    use chrono::NaiveDate;
    use chrono_tz::Tz;

    fn make_signal(ticker: &str, ff_value: f64) -> Signal {
        Signal {
            signal_id: Uuid::nil(),
            ticker: ticker.to_string(),
            as_of_ts: 0,
            front_expiry: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            back_expiry: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            front_dte: 30,
            back_dte: 60,
            front_iv: 0.2,
            back_iv: 0.18,
            sigma_fwd: 0.16,
            ff_value,
            vol_point: crate::model::policy::VolPoint::Atm,
            quality_score: 1.0,
            reason_codes: vec![],
            dedupe_key: format!("{ticker}-{ff_value}"),
        }
    }

    #[tokio::test]
    async fn below_threshold_is_dropped_not_sent() {
        let store = Arc::new(InMemorySignalStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let messenger = Arc::new(FakeMessenger::new());
        let queue = Arc::new(InMemoryNotificationQueue::new());

        let user = Uuid::new_v4();
        let mut policy = UserPolicy::default();
        policy.ff_threshold = 0.5;
        directory.add_subscriber("SPY", user, policy);

        let signal = store.create(make_signal("SPY", 0.1)).await.unwrap().unwrap();

        let router = NotificationRouter::new(queue, store, directory, messenger.clone(), Counters::default(), 3);
        let outcome = router
            .process_one(NotificationJob { signal_id: signal.signal_id, user_id: user })
            .await;
        assert_eq!(outcome, Err(DropReason::BelowThreshold));
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn quiet_hours_drops_notification() {
        let store = Arc::new(InMemorySignalStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let messenger = Arc::new(FakeMessenger::new());
        let queue = Arc::new(InMemoryNotificationQueue::new());

        let user = Uuid::new_v4();
        let mut policy = UserPolicy::default();
        policy.ff_threshold = 0.1;
        policy.timezone = Tz::UTC;
        policy.quiet_hours = QuietHours {
            enabled: true,
            start: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end: chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        };
        directory.add_subscriber("SPY", user, policy);

        let signal = store.create(make_signal("SPY", 0.3)).await.unwrap().unwrap();

        let router = NotificationRouter::new(queue, store, directory, messenger.clone(), Counters::default(), 3);
        let outcome = router
            .process_one(NotificationJob { signal_id: signal.signal_id, user_id: user })
            .await;
        assert_eq!(outcome, Err(DropReason::QuietHours));
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn permanent_messenger_failure_deactivates_user() {
        let store = Arc::new(InMemorySignalStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let messenger = Arc::new(FakeMessenger::new());
        let queue = Arc::new(InMemoryNotificationQueue::new());

        let user = Uuid::new_v4();
        let mut policy = UserPolicy::default();
        policy.ff_threshold = 0.1;
        directory.add_subscriber("SPY", user, policy);
        messenger.push(user, Err(MessengerError::permanent("unreachable")));

        let signal = store.create(make_signal("SPY", 0.3)).await.unwrap().unwrap();

        let router = NotificationRouter::new(queue, store, directory.clone(), messenger, Counters::default(), 3);
        let outcome = router
            .process_one(NotificationJob { signal_id: signal.signal_id, user_id: user })
            .await;
        assert_eq!(outcome, Err(DropReason::PermanentMessengerFailure));
        assert!(directory.subscribers("SPY").await.unwrap().is_empty());
    }
}
