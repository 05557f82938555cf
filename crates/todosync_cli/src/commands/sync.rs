//! Sync command implementation.

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::Path;
use tokio::sync::mpsc;
use todosync_engine::{
    ConflictMode, MemoryStore, ProgressEvent, RunReport, SyncConfig, SyncOrchestrator,
};
use todosync_protocol::{Conflict, ConflictPolicy, Resolution, TaskRecord};

/// Synchronizes the task file at `path` with `server`.
///
/// Without `prefer`, every conflict is asked on the terminal. The file is
/// saved after the run whether or not it succeeded, since reconciliation
/// applies record by record.
pub async fn run(
    path: &Path,
    server: SocketAddr,
    client_id: i32,
    prefer: Option<ConflictPolicy>,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let store = MemoryStore::load(path)?;
    let orchestrator = SyncOrchestrator::new(SyncConfig::new(server, client_id), store);
    let mode = match prefer {
        Some(policy) => ConflictMode::Automatic(policy),
        None => ConflictMode::Interactive,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let handle = orchestrator.start(mode, tx)?;

    while let Some(event) = rx.recv().await {
        if let Some(message) = event.message {
            eprintln!("{message}");
        }
        if let Some(prompt) = event.prompt {
            let conflict = prompt.conflict().clone();
            let resolution = tokio::task::spawn_blocking(move || ask(&conflict)).await??;
            prompt.answer(resolution);
        }
        if let Some(error) = event.error {
            eprintln!("Sync failed: {error}");
        }
        if event.done {
            break;
        }
    }

    let result = handle.wait().await;
    orchestrator.store().lock().save(path)?;
    Ok(result?)
}

/// One-line summary of a completed run.
pub fn summary(report: &RunReport) -> String {
    format!(
        "Synchronized: {} pulled, {} new, {} updated, {} deleted pushed, {} imported",
        report.pulled,
        report.pushed_new,
        report.pushed_updated,
        report.pushed_deleted,
        report.imported
    )
}

fn ask(conflict: &Conflict) -> io::Result<Resolution> {
    let stdin = io::stdin();
    let mut stderr = io::stderr();
    loop {
        writeln!(stderr, "Conflict: {conflict}")?;
        if let Some(local) = conflict.local() {
            writeln!(stderr, "  local:  {}", describe(local))?;
        }
        if let Some(remote) = conflict.remote() {
            writeln!(stderr, "  server: {}", describe(remote))?;
        }
        write!(stderr, "Keep [l]ocal or [s]erver? ")?;
        stderr.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no answer to conflict prompt",
            ));
        }
        if let Some(resolution) = parse_answer(&line) {
            return Ok(resolution);
        }
    }
}

fn parse_answer(line: &str) -> Option<Resolution> {
    match line.trim().to_ascii_lowercase().as_str() {
        "l" | "local" => Some(Resolution::PickLocal),
        "s" | "server" | "r" | "remote" => Some(Resolution::PickRemote),
        _ => None,
    }
}

fn describe(task: &TaskRecord) -> String {
    format!(
        "'{}' due {} p{} {} (revision {})",
        task.title, task.deadline, task.priority, task.status, task.revision
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use todosync_engine::TaskStore;
    use todosync_server::{ServerConfig, SyncServer};

    #[test]
    fn answers_are_parsed() {
        assert_eq!(parse_answer("l\n"), Some(Resolution::PickLocal));
        assert_eq!(parse_answer(" Server "), Some(Resolution::PickRemote));
        assert_eq!(parse_answer("r"), Some(Resolution::PickRemote));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[tokio::test]
    async fn sync_saves_server_identifiers() {
        let handle = SyncServer::new(ServerConfig::loopback()).spawn().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        let mut store = MemoryStore::new();
        store
            .create_local(TaskRecord::draft("Call mom", "2024-05-12", 1, "open"))
            .unwrap();
        store.save(&path).unwrap();

        let report = run(
            &path,
            handle.local_addr(),
            3,
            Some(ConflictPolicy::PreferRemote),
        )
        .await
        .unwrap();

        assert_eq!(report.pushed_new, 1);
        assert!(summary(&report).contains("1 new"));
        let saved = MemoryStore::load(&path).unwrap();
        assert_eq!(saved.live_tasks()[0].id, 1);
        assert_eq!(handle.store().records(3)[0].title, "Call mom");
    }
}
