//! Storage collaborator of the reconciliation pass.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use todosync_protocol::{MirrorRecord, TaskRecord, NEW_REVISION};

/// Storage operations driven by a sync run.
///
/// The local table holds the user's records, some of them tombstoned. The
/// remote mirror is a per-run staging area: it is filled with the server's
/// records, then rewritten by reconciliation into the outbound changeset.
pub trait TaskStore: Send {
    /// Inserts a record that has never been synchronized.
    ///
    /// The record is given a provisional negative identifier and
    /// [`NEW_REVISION`]. Returns the stored record.
    fn create_local(&mut self, record: TaskRecord) -> SyncResult<TaskRecord>;

    /// Every local record, tombstoned ones included.
    fn list_local_including_deleted(&self) -> SyncResult<Vec<TaskRecord>>;

    /// Returns true if the record was deleted locally.
    fn is_tombstoned(&self, id: i64) -> SyncResult<bool>;

    /// Creates an empty remote mirror.
    fn begin_mirror(&mut self) -> SyncResult<()>;

    /// Drops the remote mirror.
    fn discard_mirror(&mut self) -> SyncResult<()>;

    /// Stores a record pulled from the server.
    fn import_remote_mirror(&mut self, record: TaskRecord) -> SyncResult<()>;

    /// The pulled server record for `id`, if it has not been consumed.
    fn get_remote_mirror(&self, id: i64) -> SyncResult<Option<TaskRecord>>;

    /// Stages the change from `remote` to `local` for pushing.
    fn stage_outbound_diff(&mut self, remote: &TaskRecord, local: &TaskRecord) -> SyncResult<()>;

    /// Overwrites the local record with the server's and drops its
    /// tombstone.
    fn replace_local_with_remote(&mut self, remote: &TaskRecord) -> SyncResult<()>;

    /// Removes a local record and its tombstone.
    fn delete_local_permanently(&mut self, id: i64) -> SyncResult<()>;

    /// Removes the mirror entry for `id`.
    fn remove_remote_mirror_entry(&mut self, id: i64) -> SyncResult<()>;

    /// Turns the mirror entry for `id` into a pending deletion.
    fn stage_outbound_deletion(&mut self, id: i64) -> SyncResult<()>;

    /// Sets the revision of a local record.
    fn bump_local_revision(&mut self, id: i64, revision: i32) -> SyncResult<()>;

    /// Stages a local record as new to the server.
    fn insert_provisional_to_mirror(&mut self, local: &TaskRecord) -> SyncResult<()>;

    /// Staged new records.
    fn list_new_outbound(&self) -> SyncResult<Vec<TaskRecord>>;

    /// Staged partial updates.
    fn list_updated_outbound(&self) -> SyncResult<Vec<MirrorRecord>>;

    /// Identifiers staged for deletion.
    fn list_deleted_outbound(&self) -> SyncResult<Vec<i64>>;

    /// Copies every pulled record whose identifier is unknown locally into
    /// the local table at revision 1. Returns the number imported.
    fn import_unknown_mirror_entries_as_local(&mut self) -> SyncResult<usize>;

    /// Gives provisional records their final identifiers and revision 1.
    /// Returns the number adjusted.
    fn adjust_provisional_identifiers(&mut self) -> SyncResult<usize>;
}

/// An entry of the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEntry {
    /// A record as pulled from the server, not yet reconciled.
    Pulled(TaskRecord),
    /// A record staged as new to the server.
    New(TaskRecord),
    /// A staged partial update.
    Updated(MirrorRecord),
    /// A staged deletion.
    Deleted,
}

/// An in-memory task store, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    tasks: BTreeMap<i64, TaskRecord>,
    #[serde(default)]
    tombstones: BTreeSet<i64>,
    next_provisional: i64,
    #[serde(skip)]
    mirror: Option<BTreeMap<i64, MirrorEntry>>,
    #[serde(skip)]
    staged_new: i32,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            tombstones: BTreeSet::new(),
            next_provisional: -1,
            mirror: None,
            staged_new: 0,
        }
    }

    /// Creates a store holding already synchronized records.
    pub fn with_synced(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.tasks.insert(record.id, record);
        }
        store
    }

    /// Loads a store from a JSON file, or returns an empty store if the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::storage(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| SyncError::storage(format!("{}: {e}", path.display())))
    }

    /// Saves the store as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::storage(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| SyncError::storage(format!("{}: {e}", path.display())))
    }

    /// Returns a local record, tombstoned or not.
    pub fn get_local(&self, id: i64) -> Option<&TaskRecord> {
        self.tasks.get(&id)
    }

    /// Records that are not tombstoned.
    pub fn live_tasks(&self) -> Vec<TaskRecord> {
        self.tasks
            .values()
            .filter(|t| !self.tombstones.contains(&t.id))
            .cloned()
            .collect()
    }

    /// Edits a live record.
    ///
    /// A synchronized record gets its revision bumped when the edit
    /// changes its content.
    pub fn update_local(
        &mut self,
        id: i64,
        edit: impl FnOnce(&mut TaskRecord),
    ) -> SyncResult<TaskRecord> {
        if self.tombstones.contains(&id) {
            return Err(SyncError::storage(format!("record {id} is deleted")));
        }
        let current = self
            .tasks
            .get(&id)
            .ok_or_else(|| SyncError::storage(format!("no record {id}")))?;
        let mut edited = current.clone();
        edit(&mut edited);
        edited.id = id;
        edited.revision = current.revision;
        if edited.same_content(current) {
            return Ok(edited);
        }
        self.check_unique(&edited, Some(id))?;
        if !edited.is_new() {
            edited.revision = edited.revision.checked_add(1).ok_or_else(|| {
                SyncError::Protocol(format!("revision of record {id} cannot advance"))
            })?;
        }
        self.tasks.insert(id, edited.clone());
        Ok(edited)
    }

    /// Deletes a record: provisional records are removed, synchronized
    /// ones are tombstoned until the deletion reaches the server.
    pub fn delete_local(&mut self, id: i64) -> SyncResult<()> {
        let record = self
            .tasks
            .get(&id)
            .ok_or_else(|| SyncError::storage(format!("no record {id}")))?;
        if record.is_new() {
            self.tasks.remove(&id);
        } else {
            self.tombstones.insert(id);
        }
        Ok(())
    }

    /// Returns the mirror entry for `id`.
    pub fn mirror_entry(&self, id: i64) -> Option<&MirrorEntry> {
        self.mirror.as_ref().and_then(|m| m.get(&id))
    }

    /// Returns true while a mirror exists.
    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    fn check_unique(&self, record: &TaskRecord, except: Option<i64>) -> SyncResult<()> {
        let clash = self.tasks.values().any(|t| {
            Some(t.id) != except
                && !self.tombstones.contains(&t.id)
                && t.title == record.title
                && t.deadline == record.deadline
        });
        if clash {
            return Err(SyncError::storage(format!(
                "a task '{}' due {} already exists",
                record.title, record.deadline
            )));
        }
        Ok(())
    }

    fn mirror(&self) -> SyncResult<&BTreeMap<i64, MirrorEntry>> {
        self.mirror
            .as_ref()
            .ok_or_else(|| SyncError::storage("no sync run in progress"))
    }

    fn mirror_mut(&mut self) -> SyncResult<&mut BTreeMap<i64, MirrorEntry>> {
        self.mirror
            .as_mut()
            .ok_or_else(|| SyncError::storage("no sync run in progress"))
    }

    fn local_mut(&mut self, id: i64) -> SyncResult<&mut TaskRecord> {
        self.tasks
            .get_mut(&id)
            .ok_or_else(|| SyncError::storage(format!("no record {id}")))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore for MemoryStore {
    fn create_local(&mut self, record: TaskRecord) -> SyncResult<TaskRecord> {
        self.check_unique(&record, None)?;
        let id = self.next_provisional;
        self.next_provisional -= 1;
        let record = record.with_id(id).with_revision(NEW_REVISION);
        self.tasks.insert(id, record.clone());
        Ok(record)
    }

    fn list_local_including_deleted(&self) -> SyncResult<Vec<TaskRecord>> {
        Ok(self.tasks.values().cloned().collect())
    }

    fn is_tombstoned(&self, id: i64) -> SyncResult<bool> {
        Ok(self.tombstones.contains(&id))
    }

    fn begin_mirror(&mut self) -> SyncResult<()> {
        self.mirror = Some(BTreeMap::new());
        self.staged_new = 0;
        Ok(())
    }

    fn discard_mirror(&mut self) -> SyncResult<()> {
        self.mirror = None;
        self.staged_new = 0;
        Ok(())
    }

    fn import_remote_mirror(&mut self, record: TaskRecord) -> SyncResult<()> {
        self.mirror_mut()?
            .insert(record.id, MirrorEntry::Pulled(record));
        Ok(())
    }

    fn get_remote_mirror(&self, id: i64) -> SyncResult<Option<TaskRecord>> {
        Ok(match self.mirror()?.get(&id) {
            Some(MirrorEntry::Pulled(record)) => Some(record.clone()),
            _ => None,
        })
    }

    fn stage_outbound_diff(&mut self, remote: &TaskRecord, local: &TaskRecord) -> SyncResult<()> {
        let diff = MirrorRecord::diff(remote, local);
        self.mirror_mut()?
            .insert(local.id, MirrorEntry::Updated(diff));
        Ok(())
    }

    fn replace_local_with_remote(&mut self, remote: &TaskRecord) -> SyncResult<()> {
        self.tasks.insert(remote.id, remote.clone());
        self.tombstones.remove(&remote.id);
        Ok(())
    }

    fn delete_local_permanently(&mut self, id: i64) -> SyncResult<()> {
        self.tasks.remove(&id);
        self.tombstones.remove(&id);
        Ok(())
    }

    fn remove_remote_mirror_entry(&mut self, id: i64) -> SyncResult<()> {
        self.mirror_mut()?.remove(&id);
        Ok(())
    }

    fn stage_outbound_deletion(&mut self, id: i64) -> SyncResult<()> {
        self.mirror_mut()?.insert(id, MirrorEntry::Deleted);
        Ok(())
    }

    fn bump_local_revision(&mut self, id: i64, revision: i32) -> SyncResult<()> {
        self.local_mut(id)?.revision = revision;
        Ok(())
    }

    fn insert_provisional_to_mirror(&mut self, local: &TaskRecord) -> SyncResult<()> {
        let mut staged = local.clone();
        if staged.is_new() {
            self.staged_new += 1;
            staged.revision = -self.staged_new;
        }
        self.mirror_mut()?
            .insert(staged.id, MirrorEntry::New(staged));
        Ok(())
    }

    fn list_new_outbound(&self) -> SyncResult<Vec<TaskRecord>> {
        Ok(self
            .mirror()?
            .values()
            .filter_map(|entry| match entry {
                MirrorEntry::New(record) => Some(record.clone()),
                _ => None,
            })
            .collect())
    }

    fn list_updated_outbound(&self) -> SyncResult<Vec<MirrorRecord>> {
        Ok(self
            .mirror()?
            .values()
            .filter_map(|entry| match entry {
                MirrorEntry::Updated(update) => Some(update.clone()),
                _ => None,
            })
            .collect())
    }

    fn list_deleted_outbound(&self) -> SyncResult<Vec<i64>> {
        Ok(self
            .mirror()?
            .iter()
            .filter(|(_, entry)| matches!(entry, MirrorEntry::Deleted))
            .map(|(id, _)| *id)
            .collect())
    }

    fn import_unknown_mirror_entries_as_local(&mut self) -> SyncResult<usize> {
        let unknown: Vec<TaskRecord> = self
            .mirror()?
            .values()
            .filter_map(|entry| match entry {
                MirrorEntry::Pulled(record) if !self.tasks.contains_key(&record.id) => {
                    Some(record.clone())
                }
                _ => None,
            })
            .collect();
        let imported = unknown.len();
        for record in unknown {
            self.tasks.insert(record.id, record.with_revision(1));
        }
        Ok(imported)
    }

    fn adjust_provisional_identifiers(&mut self) -> SyncResult<usize> {
        let mirror = self.mirror()?;
        let max_known = self
            .tasks
            .keys()
            .chain(mirror.keys())
            .copied()
            .filter(|id| *id >= 0)
            .max()
            .unwrap_or(0);

        // Provisional identifiers count down from -1 in creation order.
        let mut provisional: Vec<i64> = self
            .tasks
            .values()
            .filter(|t| t.is_new())
            .map(|t| t.id)
            .collect();
        provisional.sort_unstable_by(|a, b| b.cmp(a));

        for (offset, old_id) in provisional.iter().enumerate() {
            let new_id = max_known + 1 + offset as i64;
            if let Some(record) = self.tasks.remove(old_id) {
                self.tasks
                    .insert(new_id, record.with_id(new_id).with_revision(1));
            }
            let mirror = self.mirror_mut()?;
            if let Some(entry) = mirror.remove(old_id) {
                let entry = match entry {
                    MirrorEntry::New(record) => MirrorEntry::New(record.with_id(new_id)),
                    other => other,
                };
                mirror.insert(new_id, entry);
            }
        }
        self.next_provisional = -1;
        Ok(provisional.len())
    }
}
