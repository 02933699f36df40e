//! Reminder evaluation: rules, the dedup record, and the invocation wrappers.

use crate::config::Config;
use crate::error::AppError;
use crate::notify::channel_from_config;
use crate::store::TaskStore;
use std::sync::Arc;

mod cycle;
mod dedup;
mod rules;
mod timer;

pub use cycle::{CycleError, CycleReport, DispatchFailure, ReminderEvaluator};
pub use dedup::{DedupStore, DirectoryDedup, InMemoryDedup};
pub use rules::{ReminderEvent, ReminderKind, ReminderSettings, day_key, evaluate, evaluate_task};
pub use timer::{Clock, SystemClock, run_timer_loop};

/// Wires an evaluator from configuration: channel, dedup record and limits.
pub fn build_evaluator(
    config: &Config,
    store: Arc<dyn TaskStore>,
) -> Result<ReminderEvaluator, AppError> {
    let settings = config.reminder_settings()?;
    let channel = channel_from_config(config)?;
    let dedup: Arc<dyn DedupStore> = match config.reminders.dedup_dir.as_deref() {
        Some(dir) => Arc::new(DirectoryDedup::open(dir)?),
        None => Arc::new(InMemoryDedup::new()),
    };

    tracing::debug!(channel = channel.name(), "reminder evaluator ready");
    Ok(ReminderEvaluator::new(store, channel, dedup, settings)
        .with_dispatch_timeout(config.dispatch_timeout())
        .with_max_in_flight(config.reminders.max_in_flight))
}
