use crate::error::AppError;
use crate::notify::{DispatchOutcome, NotificationChannel};
use crate::reminder::dedup::DedupStore;
use crate::reminder::rules::{ReminderEvent, ReminderSettings, evaluate};
use crate::store::TaskStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_IN_FLIGHT: usize = 4;

#[derive(Debug, Error)]
pub enum CycleError {
    /// Nothing was evaluated and no key was claimed.
    #[error("failed to read tasks: {0}")]
    Store(#[source] AppError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub task_id: String,
    pub kind: String,
    pub key: String,
    pub detail: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Tasks read from the store, completed ones included.
    pub checked: usize,
    pub sent: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DispatchFailure>,
}

impl CycleReport {
    fn record_failure(&mut self, event: &ReminderEvent, detail: String) {
        self.failed += 1;
        self.failures.push(DispatchFailure {
            task_id: event.task_id.clone(),
            kind: event.kind.to_string(),
            key: event.key.clone(),
            detail,
        });
    }
}

pub struct ReminderEvaluator {
    store: Arc<dyn TaskStore>,
    channel: Arc<dyn NotificationChannel>,
    dedup: Arc<dyn DedupStore>,
    settings: ReminderSettings,
    dispatch_timeout: Duration,
    max_in_flight: usize,
}

impl ReminderEvaluator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        channel: Arc<dyn NotificationChannel>,
        dedup: Arc<dyn DedupStore>,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            store,
            channel,
            dedup,
            settings,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    /// One evaluation pass at `now`.
    ///
    /// Each reminder key is claimed before its send and released again when
    /// the send fails or times out, so the next cycle retries it.
    pub async fn run_reminder_cycle(&self, now: OffsetDateTime) -> Result<CycleReport, CycleError> {
        let store = Arc::clone(&self.store);
        let tasks = tokio::task::spawn_blocking(move || store.list_active_tasks(now))
            .await
            .map_err(|err| CycleError::Store(AppError::io(format!("task store read aborted: {err}"))))?
            .map_err(CycleError::Store)?;

        let mut report = CycleReport {
            checked: tasks.len(),
            ..CycleReport::default()
        };
        let events = evaluate(now, &tasks, &self.settings);
        let limiter = Arc::new(Semaphore::new(self.max_in_flight));
        let mut in_flight = JoinSet::new();
        let mut pending = HashMap::new();

        for event in events {
            match self.dedup.try_claim(&event.key) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(key = %event.key, "reminder already sent");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(key = %event.key, error = %err, "could not claim reminder key");
                    report.record_failure(&event, err.to_string());
                    continue;
                }
            }

            let permit = match Arc::clone(&limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    self.release(&event.key);
                    report.record_failure(&event, err.to_string());
                    continue;
                }
            };

            let channel = Arc::clone(&self.channel);
            let timeout = self.dispatch_timeout;
            let message = event.message.clone();
            let handle = in_flight.spawn(async move {
                let outcome = dispatch(channel.as_ref(), &message, timeout).await;
                drop(permit);
                outcome
            });
            pending.insert(handle.id(), event);
        }

        while let Some(joined) = in_flight.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, outcome)) => (id, Ok(outcome)),
                Err(err) => (err.id(), Err(err)),
            };
            let Some(event) = pending.remove(&id) else {
                continue;
            };
            match result {
                Ok(outcome) if outcome.delivered => {
                    tracing::info!(
                        task_id = %event.task_id,
                        kind = %event.kind,
                        title = %event.task_title,
                        "reminder sent"
                    );
                    report.sent += 1;
                }
                Ok(outcome) => {
                    tracing::warn!(
                        task_id = %event.task_id,
                        kind = %event.kind,
                        detail = %outcome.detail,
                        "reminder dispatch failed"
                    );
                    self.release(&event.key);
                    report.record_failure(&event, outcome.detail);
                }
                Err(err) => {
                    tracing::error!(
                        task_id = %event.task_id,
                        kind = %event.kind,
                        error = %err,
                        "reminder dispatch task aborted"
                    );
                    self.release(&event.key);
                    report.record_failure(&event, format!("dispatch aborted: {err}"));
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            sent = report.sent,
            failed = report.failed,
            "reminder cycle finished"
        );
        Ok(report)
    }

    fn release(&self, key: &str) {
        if let Err(err) = self.dedup.release(key) {
            tracing::error!(key, error = %err, "could not release reminder key");
        }
    }
}

async fn dispatch(
    channel: &dyn NotificationChannel,
    message: &str,
    timeout: Duration,
) -> DispatchOutcome {
    match tokio::time::timeout(timeout, channel.send(message)).await {
        Ok(outcome) => outcome,
        Err(_) => DispatchOutcome::failed(format!("timed out after {}ms", timeout.as_millis())),
    }
}
