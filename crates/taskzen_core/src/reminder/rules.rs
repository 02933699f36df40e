//! Pure reminder decisions.
//!
//! Nothing here reads a clock or touches the dedup record: the same
//! `(now, tasks, settings)` always yields the same events. The UTC offset
//! carried by `now` defines the local calendar day and hour of day.

use crate::model::{Recurrence, Task};
use std::fmt;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSettings {
    /// How long before the due instant the due-soon reminder opens.
    pub due_soon_window: Duration,
    /// Suppress due-soon on the due date's own calendar day.
    pub same_day_exclusion: bool,
    /// Imminent lookahead windows in minutes, largest first.
    pub imminent_windows: Vec<u32>,
    /// Width in minutes of each imminent band `(window - band, window]`.
    /// Must not be narrower than the polling interval.
    pub imminent_band: u32,
    /// Local hour at or after which recurring tasks without progress are nudged.
    pub recurring_hour: u8,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            due_soon_window: Duration::hours(24),
            same_day_exclusion: true,
            imminent_windows: vec![30, 10],
            imminent_band: 5,
            recurring_hour: 19,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    DueSoon,
    Imminent { window: u32 },
    Overdue,
    RecurringNudge,
}

impl ReminderKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DueSoon => "due-soon",
            Self::Imminent { .. } => "imminent",
            Self::Overdue => "overdue",
            Self::RecurringNudge => "recurring",
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imminent { window } => write!(f, "imminent-{window}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderEvent {
    pub kind: ReminderKind,
    pub task_id: String,
    pub task_title: String,
    /// Identifies this notification instance in the dedup record.
    pub key: String,
    pub message: String,
}

pub fn evaluate(now: OffsetDateTime, tasks: &[Task], settings: &ReminderSettings) -> Vec<ReminderEvent> {
    tasks
        .iter()
        .flat_map(|task| evaluate_task(now, task, settings))
        .collect()
}

pub fn evaluate_task(
    now: OffsetDateTime,
    task: &Task,
    settings: &ReminderSettings,
) -> Vec<ReminderEvent> {
    if task.completed {
        return Vec::new();
    }

    if task.is_deadline() {
        match task.due_date {
            Some(due) => deadline_events(now, task, due.to_offset(now.offset()), settings),
            None => Vec::new(),
        }
    } else {
        recurring_event(now, task, settings).into_iter().collect()
    }
}

fn deadline_events(
    now: OffsetDateTime,
    task: &Task,
    due: OffsetDateTime,
    settings: &ReminderSettings,
) -> Vec<ReminderEvent> {
    let mut events = Vec::new();
    let due_day = day_key(due.date());

    let same_day = now.date() == due.date();
    // A window reaching past the representable range is open from the start.
    let window_open = due
        .checked_sub(settings.due_soon_window)
        .is_none_or(|opens| now > opens);
    if window_open
        && now < due
        && !(settings.same_day_exclusion && same_day)
    {
        events.push(ReminderEvent {
            kind: ReminderKind::DueSoon,
            task_id: task.id.clone(),
            task_title: task.title.clone(),
            key: format!("{}-due-soon-{}", task.id, due_day),
            message: format!(
                "⏰ Task due soon: \"{}\" is due at {}.",
                task.title,
                clock_time(due)
            ),
        });
    }

    let minutes_until_due = (due - now).whole_minutes();
    if minutes_until_due > 0 {
        let band = i64::from(settings.imminent_band);
        for &window in &settings.imminent_windows {
            let upper = i64::from(window);
            if minutes_until_due <= upper && minutes_until_due > upper - band {
                events.push(ReminderEvent {
                    kind: ReminderKind::Imminent { window },
                    task_id: task.id.clone(),
                    task_title: task.title.clone(),
                    key: format!("{}-imminent-{}-{}", task.id, window, hour_key(due)),
                    message: format!("❗ Task due in {window} minutes: \"{}\".", task.title),
                });
            }
        }
    }

    if now > due {
        events.push(ReminderEvent {
            kind: ReminderKind::Overdue,
            task_id: task.id.clone(),
            task_title: task.title.clone(),
            key: format!("{}-overdue-{}", task.id, due_day),
            message: format!(
                "⚠️ Task overdue: \"{}\" was due on {}.",
                task.title,
                month_day_time(due)
            ),
        });
    }

    events
}

fn recurring_event(
    now: OffsetDateTime,
    task: &Task,
    settings: &ReminderSettings,
) -> Option<ReminderEvent> {
    let today = day_key(now.date());
    if task.progress_on(&today).is_some() || now.hour() < settings.recurring_hour {
        return None;
    }

    Some(ReminderEvent {
        kind: ReminderKind::RecurringNudge,
        task_id: task.id.clone(),
        task_title: task.title.clone(),
        key: format!("{}-recurring-{}", task.id, today),
        message: format!(
            "🔁 {} reminder: Don't forget to log your progress for \"{}\" today!",
            cadence_label(task.recurrence),
            task.title
        ),
    })
}

fn cadence_label(recurrence: Recurrence) -> &'static str {
    match recurrence {
        Recurrence::Weekly => "Weekly",
        Recurrence::Monthly => "Monthly",
        Recurrence::Daily | Recurrence::None => "Daily",
    }
}

/// `YYYY-MM-DD`, the same shape progress entries use.
pub fn day_key(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

fn hour_key(at: OffsetDateTime) -> String {
    format!("{}-{:02}", day_key(at.date()), at.hour())
}

fn clock_time(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[hour repr:12 padding:none]:[minute] [period]"
    ))
    .unwrap_or_else(|_| at.time().to_string())
}

fn month_day_time(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[month repr:short] [day padding:none], [hour repr:12 padding:none]:[minute] [period]"
    ))
    .unwrap_or_else(|_| at.to_string())
}
