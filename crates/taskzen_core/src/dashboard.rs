//! Read-only summary of the store for the `stats` command.

use crate::model::{Project, Task};
use crate::reminder::day_key;
use serde::Serialize;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub task_id: String,
    pub title: String,
    pub current: f64,
    pub target: f64,
    pub unit: Option<String>,
    /// Not capped at 100.
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCompletions {
    pub date: String,
    pub completed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectCount {
    pub project_id: String,
    pub name: String,
    pub tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub goals: Vec<GoalProgress>,
    /// Oldest day first, ending with today.
    pub completed_last_7_days: Vec<DailyCompletions>,
    pub by_project: Vec<ProjectCount>,
    pub upcoming: Vec<Task>,
}

/// Calendar days are taken in the offset carried by `now`.
pub fn summarize(tasks: &[Task], projects: &[Project], now: OffsetDateTime) -> Dashboard {
    let today = now.date();
    let completed = tasks.iter().filter(|task| task.completed).count();

    let goals = tasks
        .iter()
        .filter_map(|task| {
            let goal = task.goal.as_ref().filter(|goal| goal.target > 0.0)?;
            let current = task.total_progress();
            Some(GoalProgress {
                task_id: task.id.clone(),
                title: task.title.clone(),
                current,
                target: goal.target,
                unit: goal.unit.clone(),
                percent: current / goal.target * 100.0,
            })
        })
        .collect();

    let completed_last_7_days = (0..7)
        .rev()
        .map(|days_back| {
            let day = today - Duration::days(days_back);
            let count = tasks
                .iter()
                .filter(|task| task.completed)
                .filter(|task| {
                    let at = task.completed_at.unwrap_or(task.updated_at);
                    at.to_offset(now.offset()).date() == day
                })
                .count();
            DailyCompletions {
                date: day_key(day),
                completed: count,
            }
        })
        .collect();

    let by_project = projects
        .iter()
        .map(|project| ProjectCount {
            project_id: project.id.clone(),
            name: project.name.clone(),
            tasks: tasks
                .iter()
                .filter(|task| task.project_id.as_deref() == Some(project.id.as_str()))
                .count(),
        })
        .filter(|count| count.tasks > 0)
        .collect();

    let mut upcoming: Vec<Task> = tasks
        .iter()
        .filter(|task| !task.completed)
        .filter(|task| {
            task.due_date
                .is_some_and(|due| due.to_offset(now.offset()).date() > today)
        })
        .cloned()
        .collect();
    upcoming.sort_by_key(|task| task.due_date);

    Dashboard {
        total: tasks.len(),
        completed,
        active: tasks.len() - completed,
        goals,
        completed_last_7_days,
        by_project,
        upcoming,
    }
}
