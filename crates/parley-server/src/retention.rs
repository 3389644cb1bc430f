//! Retention sweep.
//!
//! On every tick the sweeper reads all conversations fresh from the store,
//! classifies each one, and clears the due ones. Each clear is its own
//! unit of work: one failure is logged and retried on the next sweep.
//! Store calls run on the blocking pool so a long delete never stalls the
//! connection tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_shared::ConversationId;
use parley_store::{ClearOutcome, Conversation, Database};

/// Persistence operations the sweep depends on.
pub trait RetentionStore: Send + 'static {
    fn list_conversations(&self) -> parley_store::Result<Vec<Conversation>>;

    /// Delete the history and stamp `last_cleared_at = now`, atomically.
    fn clear_conversation(
        &mut self,
        id: ConversationId,
        now: DateTime<Utc>,
    ) -> parley_store::Result<ClearOutcome>;
}

impl RetentionStore for Database {
    fn list_conversations(&self) -> parley_store::Result<Vec<Conversation>> {
        Database::list_conversations(self)
    }

    fn clear_conversation(
        &mut self,
        id: ConversationId,
        now: DateTime<Utc>,
    ) -> parley_store::Result<ClearOutcome> {
        Database::clear_conversation(self, id, now)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub due: usize,
    pub cleared: usize,
    pub messages_deleted: usize,
    /// Due, but already cleared for the current activity period.
    pub skipped: usize,
    pub failed: usize,
}

pub struct RetentionExecutor<S> {
    store: Arc<Mutex<S>>,
}

impl<S> Clone for RetentionExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: RetentionStore> RetentionExecutor<S> {
    pub fn new(store: Arc<Mutex<S>>) -> Self {
        Self { store }
    }

    /// Run `f` against the store on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> parley_store::Result<T> + Send + 'static,
    {
        let value = tokio::task::spawn_blocking({
            let store = self.store.clone();
            move || {
                let mut guard = store.blocking_lock();
                f(&mut *guard)
            }
        })
        .await??;
        Ok(value)
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let conversations = match self.blocking(|store| store.list_conversations()).await {
            Ok(conversations) => conversations,
            Err(e) => {
                warn!(error = %e, "Retention sweep could not list conversations");
                report.failed += 1;
                return report;
            }
        };

        for conversation in conversations {
            report.examined += 1;
            if !conversation.is_due(now) {
                continue;
            }
            report.due += 1;
            if conversation.cleared_since_activity() {
                report.skipped += 1;
                continue;
            }

            let id = conversation.id;
            let result = self
                .blocking(move |store| store.clear_conversation(id, now))
                .await;

            match result {
                Ok(ClearOutcome::Cleared { deleted }) => {
                    report.cleared += 1;
                    report.messages_deleted += deleted;
                    debug!(
                        conversation = %conversation.id,
                        policy = %conversation.retention_policy,
                        deleted,
                        "Conversation cleared"
                    );
                }
                Ok(ClearOutcome::AlreadyCleared) | Ok(ClearOutcome::NotDue) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        conversation = %conversation.id,
                        error = %e,
                        "Failed to clear conversation, will retry next sweep"
                    );
                }
            }
        }

        report
    }
}

/// Run [`RetentionExecutor::sweep`] every `period`, starting immediately.
pub fn spawn_sweeper<S: RetentionStore>(
    executor: RetentionExecutor<S>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let report = executor.sweep(Utc::now()).await;
            if report.cleared > 0 || report.failed > 0 {
                info!(
                    examined = report.examined,
                    due = report.due,
                    cleared = report.cleared,
                    skipped = report.skipped,
                    deleted = report.messages_deleted,
                    failed = report.failed,
                    "Retention sweep finished"
                );
            } else {
                debug!(examined = report.examined, "Retention sweep found nothing to clear");
            }
        }
    })
}
