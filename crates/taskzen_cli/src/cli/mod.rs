use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use taskzen_core::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: taskzen add "Quarterly report" --due 2024-07-29T10:00:00+02:00 --tag work
    /// Example: taskzen add "Read" --recurrence daily --goal-target 30 --goal-unit pages
    Add {
        title: String,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Edit a task
    ///
    /// Example: taskzen edit task-1 --title "Final report" --clear-due
    Edit {
        id: String,
        #[command(flatten)]
        fields: TaskFields,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        clear_description: bool,
        #[arg(long)]
        clear_due: bool,
        #[arg(long)]
        clear_goal: bool,
        #[arg(long)]
        clear_project: bool,
    },
    /// Delete a task
    ///
    /// Example: taskzen delete task-1
    Delete { id: String },
    /// Show details of a task
    ///
    /// Example: taskzen show task-1
    Show { id: String },
    /// Mark a task as completed
    ///
    /// Example: taskzen done task-1
    Done { id: String },
    /// Mark a completed task as open again
    ///
    /// Example: taskzen reopen task-1
    Reopen { id: String },
    /// Log progress on a recurring task
    ///
    /// Example: taskzen log task-1 12 --date 2024-07-28
    Log {
        id: String,
        value: f64,
        /// Day in YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// List tasks
    ///
    /// Example: taskzen list --status incomplete --tag work
    List {
        #[arg(long, value_enum, default_value_t = StatusArg::All)]
        status: StatusArg,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        project: ProjectCommand,
    },
    /// Show task statistics
    ///
    /// Example: taskzen stats
    Stats,
    /// Run one reminder cycle now
    ///
    /// Example: taskzen remind
    /// Example: taskzen remind --at 2024-07-28T19:05:00+02:00
    Remind {
        /// Evaluate as of this RFC3339 instant instead of the current time
        #[arg(long)]
        at: Option<String>,
    },
    /// Serve the HTTP reminder trigger and run the periodic timer
    ///
    /// Example: taskzen serve --bind 0.0.0.0:8080
    Serve {
        #[arg(long)]
        bind: Option<String>,
        /// Only answer HTTP triggers
        #[arg(long)]
        no_timer: bool,
    },
    /// Send a test message through the configured channel
    ///
    /// Example: taskzen notify-test
    NotifyTest,
}

/// Task fields shared by `add` and `edit`.
#[derive(clap::Args, Debug, Default)]
pub struct TaskFields {
    #[arg(long)]
    pub description: Option<String>,
    /// Due instant in RFC3339
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long, value_enum)]
    pub recurrence: Option<RecurrenceArg>,
    #[arg(long)]
    pub goal_target: Option<f64>,
    #[arg(long, value_enum)]
    pub goal_kind: Option<GoalKindArg>,
    #[arg(long)]
    pub goal_unit: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    /// Repeatable; on edit the list replaces the existing tags
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Example: taskzen project add "Home"
    Add { name: String },
    /// Example: taskzen project list
    List,
    /// Example: taskzen project delete project-1
    Delete { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusArg {
    All,
    Completed,
    Incomplete,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecurrenceArg {
    None,
    Daily,
    Weekly,
    Monthly,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalKindArg {
    Count,
    Amount,
}

/// Flag name used to identify config override arguments by the runtime.
pub const CONFIG_OVERRIDE_FLAG: &str = "--config-override";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    DueSoonWindowHours,
    ImminentWindows,
    RecurringHour,
    PollIntervalSecs,
    UtcOffset,
    DedupDir,
    Bind,
    LogLevel,
    LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let (field, remainder) = key_raw
        .split_once('.')
        .map(|(field, rest)| (field.trim(), Some(rest.trim())))
        .unwrap_or((key_raw.trim(), None));

    let canonical_field =
        canonicalize_flag_name(field).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match (canonical_field.as_str(), remainder) {
        ("log", Some(sub)) => match canonicalize_flag_name(sub).as_deref() {
            Some("level") => ConfigOverrideTarget::LogLevel,
            Some("format") => ConfigOverrideTarget::LogFormat,
            _ => return Err(format!("unknown log field '{sub}'")),
        },
        (field, Some(_)) => return Err(format!("{field} override cannot have subfields")),
        ("due_soon_window_hours" | "due_soon_window", None) => {
            ConfigOverrideTarget::DueSoonWindowHours
        }
        ("imminent_windows" | "imminent_windows_minutes", None) => {
            ConfigOverrideTarget::ImminentWindows
        }
        ("recurring_hour", None) => ConfigOverrideTarget::RecurringHour,
        ("poll_interval_secs" | "poll_interval", None) => ConfigOverrideTarget::PollIntervalSecs,
        ("utc_offset", None) => ConfigOverrideTarget::UtcOffset,
        ("dedup_dir", None) => ConfigOverrideTarget::DedupDir,
        ("bind", None) => ConfigOverrideTarget::Bind,
        (other, None) => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}

/// Folds every `--config-override` argument into one set; later values win.
pub fn collect_config_overrides(raw: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();

    for entry in raw {
        let parsed = parse_config_override(entry)?;
        let value = parsed.value;
        match parsed.target {
            ConfigOverrideTarget::DueSoonWindowHours => {
                overrides.due_soon_window_hours = Some(parse_number(&value, "due_soon_window_hours")?);
            }
            ConfigOverrideTarget::ImminentWindows => {
                let windows = value
                    .split(',')
                    .map(|window| parse_number(window, "imminent_windows"))
                    .collect::<Result<Vec<u32>, String>>()?;
                overrides.imminent_windows_minutes = Some(windows);
            }
            ConfigOverrideTarget::RecurringHour => {
                overrides.recurring_hour = Some(parse_number(&value, "recurring_hour")?);
            }
            ConfigOverrideTarget::PollIntervalSecs => {
                overrides.poll_interval_secs = Some(parse_number(&value, "poll_interval_secs")?);
            }
            ConfigOverrideTarget::UtcOffset => overrides.utc_offset = Some(value),
            ConfigOverrideTarget::DedupDir => overrides.dedup_dir = Some(PathBuf::from(value)),
            ConfigOverrideTarget::Bind => overrides.bind = Some(value),
            ConfigOverrideTarget::LogLevel => overrides.log_level = Some(value),
            ConfigOverrideTarget::LogFormat => overrides.log_format = Some(value),
        }
    }

    Ok(overrides)
}

fn parse_number<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{field} override expects a number, got '{}'", raw.trim()))
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
