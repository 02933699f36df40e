mod cli;

use clap::Parser;
use clap::error::ErrorKind;
use cli::{
    CONFIG_OVERRIDE_FLAG, Cli, Command, GoalKindArg, ProjectCommand, RecurrenceArg, StatusArg,
    TaskFields, collect_config_overrides,
};
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use taskzen_core::api::{self, ApiState};
use taskzen_core::config::{self, Config};
use taskzen_core::dashboard::{self, Dashboard};
use taskzen_core::error::AppError;
use taskzen_core::logging::logger_init;
use taskzen_core::model::{Goal, GoalKind, Project, Recurrence, Task};
use taskzen_core::notify::{channel_from_config, send_test_message};
use taskzen_core::reminder::{Clock, CycleReport, SystemClock, build_evaluator, run_timer_loop};
use taskzen_core::store::JsonTaskStore;
use taskzen_core::task_api::{self, NewTask, StatusFilter, TaskFilter, TaskPatch};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};
use tokio_util::sync::CancellationToken;

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Repeats")]
    recurrence: String,
    #[tabled(rename = "Tags")]
    tags: String,
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
}

fn display_instant(at: OffsetDateTime, offset: UtcOffset) -> String {
    let local = at.to_offset(offset);
    local
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| local.to_string())
}

fn task_row(task: &Task, offset: UtcOffset) -> TaskRow {
    TaskRow {
        id: task.id.clone(),
        title: task.title.clone(),
        status: if task.completed { "completed" } else { "open" }.to_string(),
        due: task
            .due_date
            .map(|due| display_instant(due, offset))
            .unwrap_or_else(|| "-".to_string()),
        recurrence: task.recurrence.label().to_string(),
        tags: task.tags.join(", "),
    }
}

fn print_tasks_table(tasks: &[Task], offset: UtcOffset) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }
    let rows: Vec<TaskRow> = tasks.iter().map(|task| task_row(task, offset)).collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{table}");
}

fn print_task_detail(task: &Task, offset: UtcOffset) {
    println!("ID:          {}", task.id);
    println!("Title:       {}", task.title);
    if let Some(description) = task.description.as_deref() {
        println!("Description: {description}");
    }
    println!(
        "Status:      {}",
        if task.completed { "completed" } else { "open" }
    );
    if let Some(completed_at) = task.completed_at {
        println!("Completed:   {}", display_instant(completed_at, offset));
    }
    if let Some(due) = task.due_date {
        println!("Due:         {}", display_instant(due, offset));
    }
    println!("Repeats:     {}", task.recurrence.label());
    if let Some(goal) = &task.goal {
        println!(
            "Goal:        {} / {} {}",
            task.total_progress(),
            goal.target,
            goal.unit.as_deref().unwrap_or("")
        );
    }
    for entry in &task.progress {
        println!("  {}  {}", entry.date, entry.value);
    }
    if let Some(project_id) = task.project_id.as_deref() {
        println!("Project:     {project_id}");
    }
    if !task.tags.is_empty() {
        println!("Tags:        {}", task.tags.join(", "));
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered =
        serde_json::to_string(value).map_err(|err| AppError::invalid_data(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn print_dashboard(summary: &Dashboard, offset: UtcOffset) {
    println!(
        "Total: {}  Completed: {}  Active: {}",
        summary.total, summary.completed, summary.active
    );

    println!("Completed over the last 7 days:");
    for day in &summary.completed_last_7_days {
        println!("  {}  {}", day.date, day.completed);
    }

    if !summary.goals.is_empty() {
        println!("Goals:");
        for goal in &summary.goals {
            println!(
                "  {}: {} / {} {} ({:.0}%)",
                goal.title,
                goal.current,
                goal.target,
                goal.unit.as_deref().unwrap_or(""),
                goal.percent
            );
        }
    }

    if !summary.by_project.is_empty() {
        println!("Projects:");
        for project in &summary.by_project {
            println!("  {}: {}", project.name, project.tasks);
        }
    }

    println!("Upcoming:");
    print_tasks_table(&summary.upcoming, offset);
}

fn print_cycle_report(report: &CycleReport) {
    println!(
        "Checked {} task(s): {} sent, {} failed",
        report.checked, report.sent, report.failed
    );
    for failure in &report.failures {
        println!(
            "  {} ({}) failed: {}",
            failure.task_id, failure.kind, failure.detail
        );
    }
}

fn parse_instant(raw: &str, field: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map_err(|_| AppError::invalid_input(format!("{field} must be RFC3339")))
}

fn parse_day(raw: &str) -> Result<Date, AppError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::invalid_input("date must be YYYY-MM-DD"))
}

fn recurrence_from(arg: RecurrenceArg) -> Recurrence {
    match arg {
        RecurrenceArg::None => Recurrence::None,
        RecurrenceArg::Daily => Recurrence::Daily,
        RecurrenceArg::Weekly => Recurrence::Weekly,
        RecurrenceArg::Monthly => Recurrence::Monthly,
    }
}

fn goal_from(fields: &TaskFields) -> Result<Option<Goal>, AppError> {
    match fields.goal_target {
        Some(target) => Ok(Some(Goal {
            kind: match fields.goal_kind.unwrap_or(GoalKindArg::Count) {
                GoalKindArg::Count => GoalKind::Count,
                GoalKindArg::Amount => GoalKind::Amount,
            },
            target,
            unit: fields.goal_unit.clone(),
        })),
        None if fields.goal_kind.is_some() || fields.goal_unit.is_some() => {
            Err(AppError::invalid_input("--goal-target is required for a goal"))
        }
        None => Ok(None),
    }
}

fn new_task_from(title: String, fields: TaskFields) -> Result<NewTask, AppError> {
    Ok(NewTask {
        goal: goal_from(&fields)?,
        due_date: fields
            .due
            .as_deref()
            .map(|due| parse_instant(due, "due"))
            .transpose()?,
        recurrence: fields.recurrence.map(recurrence_from).unwrap_or_default(),
        title,
        description: fields.description,
        project_id: fields.project,
        tags: fields.tags,
    })
}

struct EditFlags {
    title: Option<String>,
    clear_description: bool,
    clear_due: bool,
    clear_goal: bool,
    clear_project: bool,
}

fn patch_from(fields: TaskFields, flags: EditFlags) -> Result<TaskPatch, AppError> {
    let goal = goal_from(&fields)?;
    Ok(TaskPatch {
        title: flags.title,
        description: clearable(fields.description, flags.clear_description),
        due_date: clearable(
            fields
                .due
                .as_deref()
                .map(|due| parse_instant(due, "due"))
                .transpose()?,
            flags.clear_due,
        ),
        recurrence: fields.recurrence.map(recurrence_from),
        goal: clearable(goal, flags.clear_goal),
        project_id: clearable(fields.project, flags.clear_project),
        tags: (!fields.tags.is_empty()).then_some(fields.tags),
    })
}

fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear { Some(None) } else { value.map(Some) }
}

fn print_project(project: &Project, verb: &str, json: bool) -> Result<(), AppError> {
    if json {
        print_json(project)
    } else {
        println!("{verb} project: {} ({})", project.name, project.id);
        Ok(())
    }
}

fn print_task_change(task: &Task, verb: &str, json: bool) -> Result<(), AppError> {
    if json {
        print_json(task)
    } else {
        println!("{verb} task: {} ({})", task.title, task.id);
        Ok(())
    }
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn load_runtime_config(cli: &Cli) -> Result<(Config, Option<AppError>), AppError> {
    let loaded = config::load_config_with_fallback();
    let overrides = collect_config_overrides(&cli.config_override)
        .map_err(|err| AppError::invalid_input(format!("{CONFIG_OVERRIDE_FLAG}: {err}")))?;
    let config = config::merge_overrides(&config::apply_env(loaded.config), &overrides);
    Ok((config, loaded.error))
}

async fn run_command(cli: Cli, config: Config) -> Result<(), AppError> {
    let offset = config.utc_offset()?;
    let clock = SystemClock::new(offset);

    match cli.command {
        Command::Add { title, fields } => {
            let task = task_api::add_task(new_task_from(title, fields)?)?;
            print_task_change(&task, "Added", cli.json)?;
        }
        Command::Edit {
            id,
            fields,
            title,
            clear_description,
            clear_due,
            clear_goal,
            clear_project,
        } => {
            let patch = patch_from(
                fields,
                EditFlags {
                    title,
                    clear_description,
                    clear_due,
                    clear_goal,
                    clear_project,
                },
            )?;
            let task = task_api::edit_task(&id, patch)?;
            print_task_change(&task, "Updated", cli.json)?;
        }
        Command::Delete { id } => {
            let task = task_api::delete_task(&id)?;
            print_task_change(&task, "Deleted", cli.json)?;
        }
        Command::Show { id } => {
            let task = task_api::get_task(&id)?;
            if cli.json {
                print_json(&task)?;
            } else {
                print_task_detail(&task, offset);
            }
        }
        Command::Done { id } => {
            let task = task_api::complete_task(&id)?;
            print_task_change(&task, "Completed", cli.json)?;
        }
        Command::Reopen { id } => {
            let task = task_api::reopen_task(&id)?;
            print_task_change(&task, "Reopened", cli.json)?;
        }
        Command::Log { id, value, date } => {
            let day = match date.as_deref() {
                Some(raw) => parse_day(raw)?,
                None => clock.now().date(),
            };
            let task = task_api::log_progress(&id, day, value)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!(
                    "Logged {value} on {day} for {} (total {})",
                    task.title,
                    task.total_progress()
                );
            }
        }
        Command::List { status, tag } => {
            let filter = TaskFilter {
                status: match status {
                    StatusArg::All => StatusFilter::All,
                    StatusArg::Completed => StatusFilter::Completed,
                    StatusArg::Incomplete => StatusFilter::Incomplete,
                },
                tag,
            };
            let tasks = task_api::list_tasks(&filter)?;
            if cli.json {
                print_json(&tasks)?;
            } else {
                print_tasks_table(&tasks, offset);
            }
        }
        Command::Project { project } => match project {
            ProjectCommand::Add { name } => {
                let project = task_api::add_project(&name)?;
                print_project(&project, "Added", cli.json)?;
            }
            ProjectCommand::List => {
                let projects = task_api::list_projects()?;
                if cli.json {
                    print_json(&projects)?;
                } else if projects.is_empty() {
                    println!("No projects found.");
                } else {
                    let rows: Vec<ProjectRow> = projects
                        .iter()
                        .map(|project| ProjectRow {
                            id: project.id.clone(),
                            name: project.name.clone(),
                            created: display_instant(project.created_at, offset),
                        })
                        .collect();
                    let mut table = Table::new(rows);
                    table.with(Style::modern());
                    println!("{table}");
                }
            }
            ProjectCommand::Delete { id } => {
                let project = task_api::delete_project(&id)?;
                print_project(&project, "Deleted", cli.json)?;
            }
        },
        Command::Stats => {
            let state = task_api::load_state()?;
            let summary = dashboard::summarize(&state.tasks, &state.projects, clock.now());
            if cli.json {
                print_json(&summary)?;
            } else {
                print_dashboard(&summary, offset);
            }
        }
        Command::Remind { at } => {
            let now = match at.as_deref() {
                Some(raw) => parse_instant(raw, "--at")?,
                None => clock.now(),
            };
            let store = Arc::new(JsonTaskStore::from_env()?);
            let evaluator = build_evaluator(&config, store)?;
            let report = evaluator
                .run_reminder_cycle(now)
                .await
                .map_err(|err| AppError::io(err.to_string()))?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_cycle_report(&report);
            }
        }
        Command::Serve { bind, no_timer } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            serve(&config, &bind, config.server.timer && !no_timer, clock).await?;
        }
        Command::NotifyTest => {
            let channel = channel_from_config(&config)?;
            let outcome = send_test_message(channel.as_ref()).await;
            if !outcome.delivered {
                return Err(AppError::io(outcome.detail));
            }
            if cli.json {
                print_json(&serde_json::json!({
                    "channel": channel.name(),
                    "delivered": true,
                }))?;
            } else {
                println!("Test message sent via {}", channel.name());
            }
        }
    }

    Ok(())
}

async fn serve(
    config: &Config,
    bind: &str,
    with_timer: bool,
    clock: SystemClock,
) -> Result<(), AppError> {
    let store = Arc::new(JsonTaskStore::from_env()?);
    let evaluator = Arc::new(build_evaluator(config, store)?);
    let clock: Arc<dyn Clock> = Arc::new(clock);
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        signal_token.cancel();
    });

    let timer = if with_timer {
        Some(tokio::spawn(run_timer_loop(
            Arc::clone(&evaluator),
            Arc::clone(&clock),
            config.poll_interval()?,
            shutdown.clone(),
        )))
    } else {
        None
    };

    let state = ApiState::new(evaluator, config.server.cron_secret.clone(), clock);
    let served = api::serve(bind, api::router(state), shutdown.clone()).await;
    shutdown.cancel();

    if let Some(timer) = timer
        && let Err(err) = timer.await
    {
        tracing::error!(error = %err, "reminder timer task failed");
    }
    served
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    let (config, load_error) = match load_runtime_config(&cli) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
    };

    match config.logger_config() {
        Ok(logger) => {
            if let Err(err) = logger_init(&logger) {
                eprintln!("WARNING: logging disabled: {err}");
            }
        }
        Err(err) => eprintln!("WARNING: logging disabled: {err}"),
    }
    if let Some(err) = load_error {
        tracing::warn!(error = %err, "config file ignored, using defaults");
    }

    if let Err(err) = run_command(cli, config).await {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
