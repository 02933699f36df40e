use crate::error::AppError;
use crate::model::Task;
use crate::storage::json_store;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Read side of the task store as the reminder evaluator sees it.
pub trait TaskStore: Send + Sync {
    /// Every task, completed ones included, as of the latest committed write.
    fn list_active_tasks(&self, now: OffsetDateTime) -> Result<Vec<Task>, AppError>;
}

#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            path: json_store::store_path()?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStore for JsonTaskStore {
    fn list_active_tasks(&self, _now: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        json_store::load_tasks(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonTaskStore, TaskStore};
    use crate::storage::json_store;
    use crate::test_support::{sample_task, temp_path, ts};

    #[test]
    fn lists_completed_tasks_too() {
        let path = temp_path("store-list.json");
        let mut done = sample_task("task-2", "done");
        done.completed = true;
        json_store::save_tasks(&path, &[sample_task("task-1", "open"), done]).unwrap();

        let tasks = JsonTaskStore::new(&path)
            .list_active_tasks(ts("2024-07-28T12:00:00Z"))
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn malformed_store_is_an_error() {
        let path = temp_path("store-bad.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonTaskStore::new(&path)
            .list_active_tasks(ts("2024-07-28T12:00:00Z"))
            .unwrap_err();
        std::fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }
}
