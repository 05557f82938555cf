//! Local task editing commands.

use super::CliError;
use std::path::Path;
use time::macros::format_description;
use time::Date;
use todosync_engine::{MemoryStore, TaskStore};
use todosync_protocol::TaskRecord;

/// Fields of a task to create.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Title.
    pub title: String,
    /// Deadline as `YYYY-MM-DD`.
    pub deadline: String,
    /// Priority.
    pub priority: i32,
    /// Status.
    pub status: String,
    /// Description.
    pub description: String,
}

/// Fields to change on an existing task.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    /// New title.
    pub title: Option<String>,
    /// New deadline.
    pub deadline: Option<String>,
    /// New priority.
    pub priority: Option<i32>,
    /// New status.
    pub status: Option<String>,
    /// New description.
    pub description: Option<String>,
}

/// Creates a task and saves the file.
pub fn add(path: &Path, task: NewTask) -> Result<TaskRecord, Box<dyn std::error::Error>> {
    if task.title.trim().is_empty() {
        return Err(CliError::EmptyTitle.into());
    }
    check_deadline(&task.deadline)?;

    let mut store = MemoryStore::load(path)?;
    let record = store.create_local(
        TaskRecord::draft(task.title, task.deadline, task.priority, task.status)
            .with_description(task.description),
    )?;
    store.save(path)?;
    tracing::debug!(id = record.id, "task added");
    Ok(record)
}

/// Renders the live tasks.
pub fn list(path: &Path, format: &str) -> Result<String, Box<dyn std::error::Error>> {
    let store = MemoryStore::load(path)?;
    let tasks = store.live_tasks();
    match format {
        "json" => Ok(serde_json::to_string_pretty(&tasks)? + "\n"),
        "text" => Ok(render_text(&tasks)),
        other => Err(CliError::UnknownFormat(other.to_string()).into()),
    }
}

/// Applies `changes` to a live task and saves the file.
pub fn edit(
    path: &Path,
    id: i64,
    changes: TaskChanges,
) -> Result<TaskRecord, Box<dyn std::error::Error>> {
    if let Some(deadline) = &changes.deadline {
        check_deadline(deadline)?;
    }
    if changes.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(CliError::EmptyTitle.into());
    }

    let mut store = MemoryStore::load(path)?;
    if store.is_tombstoned(id)? || store.get_local(id).is_none() {
        return Err(CliError::NoSuchTask(id).into());
    }
    let record = store.update_local(id, |task| {
        if let Some(title) = changes.title {
            task.title = title;
        }
        if let Some(deadline) = changes.deadline {
            task.deadline = deadline;
        }
        if let Some(priority) = changes.priority {
            task.priority = priority;
        }
        if let Some(status) = changes.status {
            task.status = status;
        }
        if let Some(description) = changes.description {
            task.description = description;
        }
    })?;
    store.save(path)?;
    Ok(record)
}

/// Deletes a live task and saves the file.
pub fn delete(path: &Path, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = MemoryStore::load(path)?;
    if store.is_tombstoned(id)? || store.get_local(id).is_none() {
        return Err(CliError::NoSuchTask(id).into());
    }
    store.delete_local(id)?;
    store.save(path)?;
    Ok(())
}

fn render_text(tasks: &[TaskRecord]) -> String {
    if tasks.is_empty() {
        return "No tasks.\n".to_string();
    }
    let mut out = String::new();
    for task in tasks {
        let marker = if task.is_new() { "*" } else { " " };
        out.push_str(&format!(
            "{marker}{:>5}  {}  p{:<3} {:<12} {}\n",
            task.id, task.deadline, task.priority, task.status, task.title
        ));
        if !task.description.is_empty() {
            out.push_str(&format!("{:>8}{}\n", "", task.description));
        }
    }
    out
}

/// Accepts a calendar date written as `YYYY-MM-DD`.
fn check_deadline(deadline: &str) -> Result<(), CliError> {
    Date::parse(deadline, format_description!("[year]-[month]-[day]"))
        .map(|_| ())
        .map_err(|_| CliError::InvalidDeadline(deadline.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            deadline: "2024-07-01".to_string(),
            priority: 2,
            status: "open".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn add_then_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");

        let first = add(&path, new_task("Water plants")).unwrap();
        let second = add(&path, new_task("Pay rent")).unwrap();
        assert_eq!((first.id, second.id), (-1, -2));

        let text = list(&path, "text").unwrap();
        assert!(text.contains("Water plants"));
        assert!(text.contains("Pay rent"));

        let json = list(&path, "json").unwrap();
        let parsed: Vec<TaskRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(list(&path, "yaml").is_err());
    }

    #[test]
    fn duplicate_title_and_deadline_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        add(&path, new_task("Water plants")).unwrap();
        assert!(add(&path, new_task("Water plants")).is_err());
    }

    #[test]
    fn edit_and_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        MemoryStore::with_synced([TaskRecord::draft("a", "2024-01-01", 1, "open")
            .with_id(4)
            .with_revision(2)])
        .save(&path)
        .unwrap();

        let edited = edit(
            &path,
            4,
            TaskChanges {
                status: Some("done".into()),
                ..TaskChanges::default()
            },
        )
        .unwrap();
        assert_eq!(edited.status, "done");
        assert_eq!(edited.revision, 3);

        delete(&path, 4).unwrap();
        assert_eq!(list(&path, "text").unwrap(), "No tasks.\n");
        assert!(delete(&path, 4).is_err());
        assert!(edit(&path, 4, TaskChanges::default()).is_err());
    }

    #[test]
    fn deadlines_are_validated() {
        assert!(check_deadline("2024-02-29").is_ok());
        assert!(check_deadline("2023-12-31").is_ok());
        for bad in [
            "2024-2-29",
            "2024-13-01",
            "2024-01-00",
            "2023-02-31",
            "2023-02-29",
            "2024-04-31",
            "tomorrow",
            "2024-01-01-01",
        ] {
            assert!(check_deadline(bad).is_err(), "{bad}");
        }
    }
}
