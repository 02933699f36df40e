use crate::error::AppError;
use crate::model::{Goal, ProgressLog, Project, Recurrence, Task};
use crate::reminder::day_key;
use crate::storage::json_store::{self, TaskState};
use std::path::Path;
use std::str::FromStr;
use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub recurrence: Recurrence,
    pub goal: Option<Goal>,
    pub project_id: Option<String>,
    pub tags: Vec<String>,
}

/// Field updates for `edit_task`. `None` leaves a field untouched; the
/// nested `Option` on clearable fields distinguishes "clear" from "keep".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<OffsetDateTime>>,
    pub recurrence: Option<Recurrence>,
    pub goal: Option<Option<Goal>>,
    pub project_id: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Incomplete,
}

impl FromStr for StatusFilter {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "completed" | "done" => Ok(Self::Completed),
            "incomplete" | "open" => Ok(Self::Incomplete),
            other => Err(AppError::invalid_input(format!(
                "status must be all, completed or incomplete, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: StatusFilter,
    pub tag: Option<String>,
}

pub fn add_task(new_task: NewTask) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    add_task_with_path(&path, new_task)
}

pub fn edit_task(id: &str, patch: TaskPatch) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    edit_task_with_path(&path, id, patch)
}

pub fn delete_task(id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    delete_task_with_path(&path, id)
}

pub fn complete_task(id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    set_completed_with_path(&path, id, true)
}

pub fn reopen_task(id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    set_completed_with_path(&path, id, false)
}

pub fn log_progress(id: &str, date: Date, value: f64) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    log_progress_with_path(&path, id, date, value)
}

pub fn list_tasks(filter: &TaskFilter) -> Result<Vec<Task>, AppError> {
    let path = json_store::store_path()?;
    list_tasks_with_path(&path, filter)
}

pub fn get_task(id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    get_task_with_path(&path, id)
}

pub fn add_project(name: &str) -> Result<Project, AppError> {
    let path = json_store::store_path()?;
    add_project_with_path(&path, name)
}

pub fn list_projects() -> Result<Vec<Project>, AppError> {
    let path = json_store::store_path()?;
    Ok(json_store::load_state(&path)?.projects)
}

pub fn delete_project(id: &str) -> Result<Project, AppError> {
    let path = json_store::store_path()?;
    delete_project_with_path(&path, id)
}

/// Tasks and projects together, as the dashboard needs them.
pub fn load_state() -> Result<TaskState, AppError> {
    let path = json_store::store_path()?;
    json_store::load_state(&path)
}

fn add_task_with_path(path: &Path, new_task: NewTask) -> Result<Task, AppError> {
    let title = required_title(&new_task.title)?;
    let mut state = json_store::load_state(path)?;
    let project_id = match new_task.project_id.as_deref() {
        Some(id) => Some(known_project(&state, id)?),
        None => None,
    };

    let now = OffsetDateTime::now_utc();
    let task = Task {
        id: unique_id("task", now, |id| state.tasks.iter().any(|task| task.id == id)),
        title,
        description: non_blank(new_task.description),
        completed: false,
        completed_at: None,
        due_date: new_task.due_date,
        recurrence: new_task.recurrence,
        goal: new_task.goal,
        progress: Vec::new(),
        project_id,
        tags: normalize_tags(&new_task.tags),
        created_at: now,
        updated_at: now,
    };
    validate_shape(&task)?;

    state.tasks.push(task.clone());
    json_store::save_state(path, &state)?;
    tracing::debug!(task_id = %task.id, "task added");

    Ok(task)
}

fn edit_task_with_path(path: &Path, id: &str, patch: TaskPatch) -> Result<Task, AppError> {
    let trimmed_id = required_id(id)?;
    if patch.is_empty() {
        return Err(AppError::invalid_input("nothing to update"));
    }

    let mut state = json_store::load_state(path)?;
    let project_id = match &patch.project_id {
        Some(Some(project)) => Some(Some(known_project(&state, project)?)),
        Some(None) => Some(None),
        None => None,
    };
    let task = find_task_mut(&mut state, trimmed_id)?;
    let mut updated = task.clone();

    if let Some(title) = patch.title.as_deref() {
        updated.title = required_title(title)?;
    }
    if let Some(description) = patch.description {
        updated.description = non_blank(description);
    }
    if let Some(recurrence) = patch.recurrence {
        updated.recurrence = recurrence;
        if recurrence.is_recurring() && patch.due_date.is_none() {
            updated.due_date = None;
        }
    }
    if let Some(due_date) = patch.due_date {
        updated.due_date = due_date;
    }
    if let Some(goal) = patch.goal {
        updated.goal = goal;
    }
    if let Some(project_id) = project_id {
        updated.project_id = project_id;
    }
    if let Some(tags) = patch.tags.as_deref() {
        updated.tags = normalize_tags(tags);
    }
    validate_shape(&updated)?;

    updated.updated_at = OffsetDateTime::now_utc();
    *task = updated.clone();
    json_store::save_state(path, &state)?;

    Ok(updated)
}

fn delete_task_with_path(path: &Path, id: &str) -> Result<Task, AppError> {
    let trimmed_id = required_id(id)?;

    let mut state = json_store::load_state(path)?;
    let index = state
        .tasks
        .iter()
        .position(|task| task.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("task not found"))?;

    let removed = state.tasks.remove(index);
    json_store::save_state(path, &state)?;

    Ok(removed)
}

fn set_completed_with_path(path: &Path, id: &str, completed: bool) -> Result<Task, AppError> {
    let trimmed_id = required_id(id)?;

    let mut state = json_store::load_state(path)?;
    let task = find_task_mut(&mut state, trimmed_id)?;
    if task.completed == completed {
        let state_name = if completed { "completed" } else { "open" };
        return Err(AppError::invalid_input(format!("task is already {state_name}")));
    }

    let now = OffsetDateTime::now_utc();
    task.completed = completed;
    task.completed_at = completed.then_some(now);
    task.updated_at = now;
    let updated = task.clone();
    json_store::save_state(path, &state)?;

    Ok(updated)
}

fn log_progress_with_path(path: &Path, id: &str, date: Date, value: f64) -> Result<Task, AppError> {
    let trimmed_id = required_id(id)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::invalid_input("progress value must be greater than 0"));
    }

    let mut state = json_store::load_state(path)?;
    let task = find_task_mut(&mut state, trimmed_id)?;
    if !task.recurrence.is_recurring() {
        return Err(AppError::invalid_input(
            "progress can only be logged on recurring tasks",
        ));
    }

    let day = day_key(date);
    match task.progress.iter_mut().find(|entry| entry.date == day) {
        Some(entry) => entry.value += value,
        None => task.progress.push(ProgressLog { date: day, value }),
    }
    task.updated_at = OffsetDateTime::now_utc();
    let updated = task.clone();
    json_store::save_state(path, &state)?;

    Ok(updated)
}

fn list_tasks_with_path(path: &Path, filter: &TaskFilter) -> Result<Vec<Task>, AppError> {
    let tag = filter.tag.as_deref().map(|tag| tag.trim().to_lowercase());
    let tasks = json_store::load_tasks(path)?
        .into_iter()
        .filter(|task| match filter.status {
            StatusFilter::All => true,
            StatusFilter::Completed => task.completed,
            StatusFilter::Incomplete => !task.completed,
        })
        .filter(|task| match tag.as_deref() {
            Some(tag) => task.tags.iter().any(|candidate| candidate == tag),
            None => true,
        })
        .collect();

    Ok(tasks)
}

fn get_task_with_path(path: &Path, id: &str) -> Result<Task, AppError> {
    let trimmed_id = required_id(id)?;

    let state = json_store::load_state(path)?;
    state
        .tasks
        .into_iter()
        .find(|task| task.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("task not found"))
}

fn add_project_with_path(path: &Path, name: &str) -> Result<Project, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("project name is required"));
    }

    let mut state = json_store::load_state(path)?;
    if state
        .projects
        .iter()
        .any(|project| project.name.eq_ignore_ascii_case(trimmed))
    {
        return Err(AppError::invalid_input("project already exists"));
    }

    let now = OffsetDateTime::now_utc();
    let project = Project {
        id: unique_id("project", now, |id| {
            state.projects.iter().any(|project| project.id == id)
        }),
        name: trimmed.to_string(),
        created_at: now,
    };
    state.projects.push(project.clone());
    json_store::save_state(path, &state)?;

    Ok(project)
}

/// Removes the project and detaches its tasks; the tasks themselves stay.
fn delete_project_with_path(path: &Path, id: &str) -> Result<Project, AppError> {
    let trimmed_id = required_id(id)?;

    let mut state = json_store::load_state(path)?;
    let index = state
        .projects
        .iter()
        .position(|project| project.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("project not found"))?;
    let removed = state.projects.remove(index);

    let now = OffsetDateTime::now_utc();
    for task in &mut state.tasks {
        if task.project_id.as_deref() == Some(trimmed_id) {
            task.project_id = None;
            task.updated_at = now;
        }
    }
    json_store::save_state(path, &state)?;

    Ok(removed)
}

/// Timestamp ids, nudged forward on the rare clash with an existing one.
fn unique_id(prefix: &str, now: OffsetDateTime, taken: impl Fn(&str) -> bool) -> String {
    let mut nanos = now.unix_timestamp_nanos();
    loop {
        let id = format!("{prefix}-{nanos}");
        if !taken(&id) {
            return id;
        }
        nanos += 1;
    }
}

fn required_id(id: &str) -> Result<&str, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }
    Ok(trimmed)
}

fn required_title(title: &str) -> Result<String, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("title is required"));
    }
    Ok(trimmed.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn find_task_mut<'a>(state: &'a mut TaskState, id: &str) -> Result<&'a mut Task, AppError> {
    state
        .tasks
        .iter_mut()
        .find(|task| task.id == id)
        .ok_or_else(|| AppError::invalid_input("task not found"))
}

fn known_project(state: &TaskState, id: &str) -> Result<String, AppError> {
    let trimmed = id.trim();
    state
        .projects
        .iter()
        .find(|project| project.id == trimmed)
        .map(|project| project.id.clone())
        .ok_or_else(|| AppError::invalid_input("project not found"))
}

/// Lowercased, trimmed, first occurrence kept.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

fn validate_shape(task: &Task) -> Result<(), AppError> {
    if task.recurrence.is_recurring() && task.due_date.is_some() {
        return Err(AppError::invalid_input(
            "recurring tasks cannot have a due date",
        ));
    }
    if let Some(goal) = &task.goal {
        if !task.recurrence.is_recurring() {
            return Err(AppError::invalid_input("goals require a recurrence"));
        }
        if !goal.target.is_finite() || goal.target <= 0.0 {
            return Err(AppError::invalid_input("goal target must be greater than 0"));
        }
    }
    Ok(())
}
