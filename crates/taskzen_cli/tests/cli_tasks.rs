use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("taskzen-{nanos}-{file_name}"))
}

fn taskzen(store_path: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskzen"))
        .args(args)
        .args(["--config-override", "utc_offset=utc"])
        .env("TASKZEN_STORE_PATH", store_path)
        .env("TASKZEN_CONFIG_PATH", store_path.with_extension("config.json"))
        .env("TASKZEN_DISABLE_NOTIFICATIONS", "1")
        .output()
        .expect("failed to run taskzen")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn add_list_and_show_round_through_the_store() {
    let store_path = temp_path("cli-add-list.json");

    let added = stdout_json(&taskzen(
        &store_path,
        &[
            "add",
            "Quarterly report",
            "--due",
            "2024-07-29T10:00:00Z",
            "--tag",
            "Work",
            "--json",
        ],
    ));
    let id = added["id"].as_str().unwrap().to_string();
    assert_eq!(added["tags"], serde_json::json!(["work"]));

    let listed = stdout_json(&taskzen(&store_path, &["list", "--json"]));
    let shown = taskzen(&store_path, &["show", &id]);
    std::fs::remove_file(&store_path).ok();

    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["title"], "Quarterly report");
    assert!(shown.status.success());
    let stdout = String::from_utf8_lossy(&shown.stdout);
    assert!(stdout.contains("Quarterly report"));
    assert!(stdout.contains("2024-07-29 10:00"));
}

#[test]
fn list_table_renders_titles() {
    let store_path = temp_path("cli-list-table.json");
    taskzen(&store_path, &["add", "Water plants"]);

    let output = taskzen(&store_path, &["list"]);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Water plants"));
    assert!(stdout.contains("Title"));
}

#[test]
fn recurring_task_with_due_date_is_rejected() {
    let store_path = temp_path("cli-recurring-due.json");

    let output = taskzen(
        &store_path,
        &[
            "add",
            "Stretch",
            "--recurrence",
            "daily",
            "--due",
            "2024-07-29T10:00:00Z",
        ],
    );
    std::fs::remove_file(&store_path).ok();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid_input"));
    assert!(stderr.contains("due date"));
}

#[test]
fn done_and_reopen_drive_status_filter() {
    let store_path = temp_path("cli-done.json");
    let added = stdout_json(&taskzen(&store_path, &["add", "Ship", "--json"]));
    let id = added["id"].as_str().unwrap().to_string();

    let done = stdout_json(&taskzen(&store_path, &["done", &id, "--json"]));
    let completed = stdout_json(&taskzen(
        &store_path,
        &["list", "--status", "completed", "--json"],
    ));
    let reopened = stdout_json(&taskzen(&store_path, &["reopen", &id, "--json"]));
    let incomplete = stdout_json(&taskzen(
        &store_path,
        &["list", "--status", "incomplete", "--json"],
    ));
    std::fs::remove_file(&store_path).ok();

    assert_eq!(done["completed"], true);
    assert!(done["completed_at"].is_string());
    assert_eq!(completed.as_array().unwrap().len(), 1);
    assert_eq!(reopened["completed"], false);
    assert_eq!(incomplete[0]["id"], id.as_str());
}

#[test]
fn progress_logging_adds_up_per_day() {
    let store_path = temp_path("cli-progress.json");
    let added = stdout_json(&taskzen(
        &store_path,
        &[
            "add",
            "Read",
            "--recurrence",
            "daily",
            "--goal-target",
            "30",
            "--goal-kind",
            "amount",
            "--goal-unit",
            "pages",
            "--json",
        ],
    ));
    let id = added["id"].as_str().unwrap().to_string();

    taskzen(&store_path, &["log", &id, "10", "--date", "2024-07-28"]);
    let logged = stdout_json(&taskzen(
        &store_path,
        &["log", &id, "5", "--date", "2024-07-28", "--json"],
    ));
    let rejected = taskzen(&store_path, &["log", &id, "0", "--date", "2024-07-28"]);
    std::fs::remove_file(&store_path).ok();

    assert_eq!(logged["progress"].as_array().unwrap().len(), 1);
    assert_eq!(logged["progress"][0]["value"], 15.0);
    assert!(!rejected.status.success());
}

#[test]
fn deleting_a_project_detaches_tasks() {
    let store_path = temp_path("cli-projects.json");
    let project = stdout_json(&taskzen(&store_path, &["project", "add", "Home", "--json"]));
    let project_id = project["id"].as_str().unwrap().to_string();
    let task = stdout_json(&taskzen(
        &store_path,
        &["add", "Paint fence", "--project", &project_id, "--json"],
    ));
    let task_id = task["id"].as_str().unwrap().to_string();

    let projects = stdout_json(&taskzen(&store_path, &["project", "list", "--json"]));
    taskzen(&store_path, &["project", "delete", &project_id]);
    let shown = stdout_json(&taskzen(&store_path, &["show", &task_id, "--json"]));
    std::fs::remove_file(&store_path).ok();

    assert_eq!(projects[0]["name"], "Home");
    assert!(shown["project_id"].is_null());
}

#[test]
fn stats_reports_totals() {
    let store_path = temp_path("cli-stats.json");
    let first = stdout_json(&taskzen(&store_path, &["add", "one", "--json"]));
    taskzen(&store_path, &["add", "two"]);
    taskzen(&store_path, &["done", first["id"].as_str().unwrap()]);

    let stats = stdout_json(&taskzen(&store_path, &["stats", "--json"]));
    std::fs::remove_file(&store_path).ok();

    assert_eq!(stats["total"], 2);
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["active"], 1);
    assert_eq!(stats["completed_last_7_days"].as_array().unwrap().len(), 7);
}

#[test]
fn bad_config_override_fails_fast() {
    let store_path = temp_path("cli-bad-override.json");

    let output = taskzen(
        &store_path,
        &["list", "--config-override", "recurring_hour=late"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--config-override"));
    assert!(!store_path.exists());
}

#[test]
fn missing_task_reports_error() {
    let store_path = temp_path("cli-missing.json");

    let output = taskzen(&store_path, &["show", "task-404"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("task not found"));
}
