use crate::model::{Recurrence, Task};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("taskzen-{nanos}-{file_name}"))
}

pub fn ts(value: &str) -> OffsetDateTime {
    OffsetDateTime::parse(value, &Rfc3339).unwrap()
}

pub fn sample_task(id: &str, title: &str) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        description: None,
        completed: false,
        completed_at: None,
        due_date: None,
        recurrence: Recurrence::None,
        goal: None,
        progress: Vec::new(),
        project_id: None,
        tags: Vec::new(),
        created_at: ts("2024-07-20T00:00:00Z"),
        updated_at: ts("2024-07-20T00:00:00Z"),
    }
}

pub fn deadline_task(id: &str, title: &str, due: &str) -> Task {
    Task {
        due_date: Some(ts(due)),
        ..sample_task(id, title)
    }
}

pub fn recurring_task(id: &str, title: &str, recurrence: Recurrence) -> Task {
    Task {
        recurrence,
        ..sample_task(id, title)
    }
}
