//! Server-side record sets.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use todosync_protocol::{Changeset, TaskRecord};

/// Counts of changes applied from one changeset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Records inserted.
    pub inserted: usize,
    /// Records patched.
    pub updated: usize,
    /// Records removed.
    pub deleted: usize,
    /// Updates or deletions naming an unknown identifier.
    pub skipped: usize,
}

/// Record sets of every registered client, keyed by client id.
///
/// The server holds the authoritative copy of each client's records.
#[derive(Debug, Default)]
pub struct ServerStore {
    clients: RwLock<HashMap<i32, BTreeMap<i64, TaskRecord>>>,
}

impl ServerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure `client_id` has a record set.
    pub fn register(&self, client_id: i32) {
        self.clients.write().entry(client_id).or_default();
    }

    /// Returns true if `client_id` has a record set.
    pub fn is_registered(&self, client_id: i32) -> bool {
        self.clients.read().contains_key(&client_id)
    }

    /// Replaces the record set of `client_id`.
    pub fn seed(&self, client_id: i32, records: impl IntoIterator<Item = TaskRecord>) {
        let set = records.into_iter().map(|r| (r.id, r)).collect();
        self.clients.write().insert(client_id, set);
    }

    /// Records of `client_id` in identifier order.
    pub fn records(&self, client_id: i32) -> Vec<TaskRecord> {
        self.clients
            .read()
            .get(&client_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Looks up one record.
    pub fn get(&self, client_id: i32, id: i64) -> Option<TaskRecord> {
        self.clients
            .read()
            .get(&client_id)
            .and_then(|set| set.get(&id).cloned())
    }

    /// Number of records held for `client_id`.
    pub fn len(&self, client_id: i32) -> usize {
        self.clients.read().get(&client_id).map_or(0, BTreeMap::len)
    }

    /// Returns true if `client_id` holds no records.
    pub fn is_empty(&self, client_id: i32) -> bool {
        self.len(client_id) == 0
    }

    /// Applies a pushed changeset to the record set of `client_id`.
    ///
    /// New records with a negative revision are stored at revision 1;
    /// others keep their revision.
    pub fn apply(&self, client_id: i32, changeset: &Changeset) -> ApplyStats {
        let mut clients = self.clients.write();
        let set = clients.entry(client_id).or_default();
        let mut stats = ApplyStats::default();

        for record in &changeset.new {
            let mut record = record.clone();
            if record.revision < 0 {
                record.revision = 1;
            }
            set.insert(record.id, record);
            stats.inserted += 1;
        }
        for id in &changeset.deleted {
            if set.remove(id).is_some() {
                stats.deleted += 1;
            } else {
                stats.skipped += 1;
            }
        }
        for update in &changeset.updated {
            match set.get_mut(&update.id) {
                Some(record) => {
                    update.apply_to(record);
                    stats.updated += 1;
                }
                None => {
                    tracing::warn!(client_id, id = update.id, "update for unknown record");
                    stats.skipped += 1;
                }
            }
        }
        stats
    }
}
