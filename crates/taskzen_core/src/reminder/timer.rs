use crate::reminder::cycle::ReminderEvaluator;
use std::sync::Arc;
use std::time::Duration;
use time::{OffsetDateTime, UtcOffset};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock viewed at a fixed offset, which decides the local day and hour.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// Runs a cycle every `period` until `shutdown` fires and returns how many ran.
///
/// Ticks that fall behind are skipped rather than bunched, and a cycle that
/// fails is logged and retried on the next tick.
pub async fn run_timer_loop(
    evaluator: Arc<ReminderEvaluator>,
    clock: Arc<dyn Clock>,
    period: Duration,
    shutdown: CancellationToken,
) -> usize {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycles = 0;

    tracing::info!(period_secs = period.as_secs_f64(), "reminder timer started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                cycles += 1;
                match evaluator.run_reminder_cycle(clock.now()).await {
                    Ok(report) => tracing::debug!(
                        checked = report.checked,
                        sent = report.sent,
                        failed = report.failed,
                        "timer cycle done"
                    ),
                    Err(err) => tracing::error!(error = %err, "reminder cycle aborted"),
                }
            }
        }
    }
    tracing::info!(cycles, "reminder timer stopped");
    cycles
}

#[cfg(test)]
mod tests {
    use super::{Clock, SystemClock, run_timer_loop};
    use crate::error::AppError;
    use crate::model::Task;
    use crate::notify::{DispatchOutcome, NotificationChannel};
    use crate::reminder::cycle::ReminderEvaluator;
    use crate::reminder::dedup::InMemoryDedup;
    use crate::reminder::rules::ReminderSettings;
    use crate::store::TaskStore;
    use crate::test_support::{deadline_task, ts};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use time::{OffsetDateTime, UtcOffset};
    use tokio_util::sync::CancellationToken;

    struct Fixed(OffsetDateTime);

    impl Clock for Fixed {
        fn now(&self) -> OffsetDateTime {
            self.0
        }
    }

    struct OneOverdue;

    impl TaskStore for OneOverdue {
        fn list_active_tasks(&self, _now: OffsetDateTime) -> Result<Vec<Task>, AppError> {
            Ok(vec![deadline_task("t1", "Report", "2024-07-27T10:00:00Z")])
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl NotificationChannel for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _message: &str) -> DispatchOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            DispatchOutcome::delivered("sent")
        }
    }

    #[test]
    fn system_clock_reports_configured_offset() {
        let offset = UtcOffset::from_hms(2, 0, 0).unwrap();
        assert_eq!(SystemClock::new(offset).now().offset(), offset);
    }

    #[tokio::test]
    async fn timer_runs_repeatedly_and_stops_on_cancel() {
        let channel = Arc::new(Counting::default());
        let evaluator = Arc::new(ReminderEvaluator::new(
            Arc::new(OneOverdue),
            channel.clone(),
            Arc::new(InMemoryDedup::new()),
            ReminderSettings::default(),
        ));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_timer_loop(
            evaluator,
            Arc::new(Fixed(ts("2024-07-28T12:00:00Z"))),
            Duration::from_millis(10),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        let cycles = handle.await.unwrap();

        assert!(cycles >= 2);
        assert_eq!(channel.0.load(Ordering::SeqCst), 1);
    }
}
