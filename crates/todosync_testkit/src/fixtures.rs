//! Test fixtures and server helpers.
//!
//! Provides sample records, seeded stores and a reference server bound
//! to an ephemeral loopback port.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use todosync_engine::{MemoryStore, SyncConfig, TransportConfig};
use todosync_protocol::TaskRecord;
use todosync_server::{ServerConfig, ServerHandle, ServerStore, SyncServer};

/// Creates a synchronized record with fixed deadline and status.
pub fn sample_task(id: i64, title: &str, revision: i32) -> TaskRecord {
    TaskRecord::draft(title, "2024-01-15", 1, "open")
        .with_id(id)
        .with_revision(revision)
}

/// Creates a draft record that has never been synchronized.
pub fn sample_draft(title: &str) -> TaskRecord {
    TaskRecord::draft(title, "2024-02-01", 2, "open")
}

/// Creates `count` synchronized records with identifiers `1..=count`.
pub fn sample_tasks(count: usize) -> Vec<TaskRecord> {
    (1..=count)
        .map(|i| {
            TaskRecord::draft(format!("Task {i}"), format!("2024-03-{:02}", i % 28 + 1), 1, "open")
                .with_id(i as i64)
                .with_revision(1)
        })
        .collect()
}

/// Creates a store holding `records` as already synchronized.
pub fn seeded_store(records: impl IntoIterator<Item = TaskRecord>) -> MemoryStore {
    MemoryStore::with_synced(records)
}

/// Transport timings short enough for loopback tests.
pub fn fast_transport() -> TransportConfig {
    TransportConfig::uniform(Duration::from_millis(200))
}

/// A reference server on an ephemeral loopback port.
///
/// The server stops when this value is dropped.
pub struct TestServer {
    handle: ServerHandle,
}

impl TestServer {
    /// Starts a server that accepts every client.
    pub fn start() -> Self {
        Self::start_with(ServerConfig::loopback())
    }

    /// Starts a server that declines every registration.
    pub fn start_declining() -> Self {
        Self::start_with(ServerConfig::loopback().declining())
    }

    /// Starts a server with `config`; the bind address is used as given.
    pub fn start_with(config: ServerConfig) -> Self {
        let handle = SyncServer::new(config)
            .spawn()
            .expect("Failed to start test server");
        Self { handle }
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// The server's record store.
    pub fn store(&self) -> Arc<ServerStore> {
        self.handle.store()
    }

    /// Seeds the record set of `client_id`.
    pub fn with_records(self, client_id: i32, records: impl IntoIterator<Item = TaskRecord>) -> Self {
        self.store().seed(client_id, records);
        self
    }

    /// Client configuration pointing at this server with fast timings.
    pub fn sync_config(&self, client_id: i32) -> SyncConfig {
        SyncConfig::new(self.addr(), client_id)
            .with_transport(fast_transport())
            .with_progress_interval(Duration::from_millis(10))
    }
}

/// A store file path inside a temporary directory.
pub struct TempStoreFile {
    _temp_dir: TempDir,
    path: PathBuf,
}

impl TempStoreFile {
    /// Creates a path to a not yet existing `tasks.json`.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("tasks.json");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TempStoreFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` with a temporary store path.
pub fn with_temp_store_file<F, R>(f: F) -> R
where
    F: FnOnce(&Path) -> R,
{
    let file = TempStoreFile::new();
    f(file.path())
}
