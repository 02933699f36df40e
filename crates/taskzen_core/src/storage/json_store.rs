use crate::error::AppError;
use crate::model::{Project, Task};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: u32 = 1;
const STORE_FILE_NAME: &str = "tasks.json";
const STORE_ENV_VAR: &str = "TASKZEN_STORE_PATH";

#[derive(Debug, Serialize, Deserialize)]
struct StoredState {
    schema_version: u32,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    projects: Vec<Project>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TaskState {
    pub tasks: Vec<Task>,
    pub projects: Vec<Project>,
}

pub fn store_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("taskzen").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("taskzen")
            .join(STORE_FILE_NAME))
    }
}

pub fn load_tasks(path: &Path) -> Result<Vec<Task>, AppError> {
    Ok(load_state(path)?.tasks)
}

pub fn load_state(path: &Path) -> Result<TaskState, AppError> {
    if !path.exists() {
        return Ok(TaskState::default());
    }

    let content = std::fs::read_to_string(path).map_err(|err| AppError::io(err.to_string()))?;
    let stored: StoredState =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    for task in &stored.tasks {
        if task.recurrence.is_recurring() && task.due_date.is_some() {
            return Err(AppError::invalid_data(format!(
                "recurring task {} must not have a due_date",
                task.id
            )));
        }
    }

    if let Some(task) = stored.tasks.iter().find(|task| {
        task.project_id
            .as_deref()
            .is_some_and(|id| !stored.projects.iter().any(|project| project.id == id))
    }) {
        return Err(AppError::invalid_data(format!(
            "task {} references an unknown project",
            task.id
        )));
    }

    Ok(TaskState {
        tasks: stored.tasks,
        projects: stored.projects,
    })
}

pub fn save_tasks(path: &Path, tasks: &[Task]) -> Result<(), AppError> {
    let projects = if path.exists() {
        load_state(path)?.projects
    } else {
        Vec::new()
    };
    let state = TaskState {
        tasks: tasks.to_vec(),
        projects,
    };
    save_state(path, &state)
}

pub fn save_state(path: &Path, state: &TaskState) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| AppError::io(err.to_string()))?;
    }

    let stored = StoredState {
        schema_version: SCHEMA_VERSION,
        tasks: state.tasks.to_vec(),
        projects: state.projects.to_vec(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    std::fs::write(path, content).map_err(|err| AppError::io(err.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions).map_err(|err| AppError::io(err.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{SCHEMA_VERSION, TaskState, load_state, load_tasks, save_state, save_tasks};
    use crate::model::{Project, Recurrence};
    use crate::test_support::{sample_task, temp_path, ts};
    use std::fs;

    #[test]
    fn save_and_load_round_trip() {
        let path = temp_path("tasks.json");
        let task = sample_task("task-1", "demo");

        save_tasks(&path, std::slice::from_ref(&task)).unwrap();
        let loaded = load_tasks(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, vec![task]);
    }

    #[test]
    fn save_tasks_keeps_existing_projects() {
        let path = temp_path("keep-projects.json");
        let project = Project {
            id: "project-1".to_string(),
            name: "Home".to_string(),
            created_at: ts("2024-07-01T00:00:00Z"),
        };
        save_state(
            &path,
            &TaskState {
                tasks: Vec::new(),
                projects: vec![project.clone()],
            },
        )
        .unwrap();

        save_tasks(&path, &[sample_task("task-1", "demo")]).unwrap();
        let loaded = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.projects, vec![project]);
        assert_eq!(loaded.tasks.len(), 1);
    }

    #[test]
    fn missing_file_loads_empty_state() {
        let path = temp_path("absent.json");
        let loaded = load_state(&path).unwrap();

        assert!(loaded.tasks.is_empty());
        assert!(loaded.projects.is_empty());
    }

    #[test]
    fn accepts_minimal_task_fields() {
        let path = temp_path("minimal.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": \"task-1\",\n      \"title\": \"demo\",\n      \"created_at\": \"2024-07-20T00:00:00Z\",\n      \"updated_at\": \"2024-07-20T00:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let loaded = load_tasks(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), 1);
        assert!(!loaded[0].completed);
        assert_eq!(loaded[0].due_date, None);
        assert_eq!(loaded[0].recurrence, Recurrence::None);
        assert!(loaded[0].progress.is_empty());
    }

    #[test]
    fn rejects_malformed_due_date() {
        let path = temp_path("bad-due.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": \"task-1\",\n      \"title\": \"demo\",\n      \"due_date\": \"tomorrow\",\n      \"created_at\": \"2024-07-20T00:00:00Z\",\n      \"updated_at\": \"2024-07-20T00:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let err = load_tasks(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn rejects_recurring_task_with_due_date() {
        let path = temp_path("recurring-due.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": \"task-1\",\n      \"title\": \"read\",\n      \"recurrence\": \"daily\",\n      \"due_date\": \"2024-07-29T10:00:00Z\",\n      \"created_at\": \"2024-07-20T00:00:00Z\",\n      \"updated_at\": \"2024-07-20T00:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let err = load_tasks(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn rejects_unknown_project_reference() {
        let path = temp_path("bad-project.json");
        let mut task = sample_task("task-1", "demo");
        task.project_id = Some("project-missing".to_string());
        let content = serde_json::json!({
            "schema_version": 1,
            "tasks": [task],
        });
        fs::write(&path, content.to_string()).unwrap();

        let err = load_state(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn schema_version_must_match() {
        let path = temp_path("bad-schema.json");
        let bad = format!(
            "{{\n  \"schema_version\": {},\n  \"tasks\": []\n}}",
            SCHEMA_VERSION + 1
        );
        fs::write(&path, bad).unwrap();

        let err = load_tasks(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }
}
