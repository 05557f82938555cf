//! Reconciliation of local records against the pulled server records.
//!
//! Each local record is observed along four axes (provisional, tombstoned,
//! revision order against the mirror, content equality) and the
//! observation is mapped to exactly one [`Case`]. Three observations are
//! genuine conflicts; for those a [`DecisionMaker`] picks between two cases.

use crate::error::{SyncError, SyncResult};
use crate::store::TaskStore;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use todosync_protocol::{Conflict, ConflictPolicy, Resolution, TaskRecord};

/// The action applied to one local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Case {
    /// Never synchronized: stage as new.
    StageNew,
    /// Local is ahead with the server's content: drop the mirror entry.
    AlreadyInSync,
    /// Local is ahead with different content: stage the diff, bump by one.
    PushLocalEdits,
    /// Server is ahead: overwrite local.
    AdoptRemote,
    /// Same revision and content: drop the entry, bump by one.
    ConfirmInSync,
    /// Same revision, different content, local chosen: bump by two and
    /// stage the diff.
    KeepLocalOnConflict,
    /// Same revision, different content, server chosen: overwrite local.
    TakeRemoteOnConflict,
    /// Missing on the server, server chosen: delete local.
    AcceptRemoteDeletion,
    /// Missing on the server, local chosen: stage as new, bump by one.
    ResurrectLocal,
    /// Deleted locally and missing on the server: purge.
    PurgeDeleted,
    /// Deleted locally but the server is ahead: restore from the server.
    RestoreNewerRemote,
    /// Deleted locally, server unchanged: push the deletion.
    PropagateDeletion,
    /// Deleted locally, server changed, server chosen: restore.
    RestoreRemoteOnConflict,
    /// Deleted locally, server changed, local chosen: push the deletion.
    DeleteOnConflict,
    /// Deleted locally after further local edits: push the deletion.
    PropagateStaleDeletion,
}

impl Case {
    /// Every case, in table order.
    pub const ALL: [Case; 15] = [
        Case::StageNew,
        Case::AlreadyInSync,
        Case::PushLocalEdits,
        Case::AdoptRemote,
        Case::ConfirmInSync,
        Case::KeepLocalOnConflict,
        Case::TakeRemoteOnConflict,
        Case::AcceptRemoteDeletion,
        Case::ResurrectLocal,
        Case::PurgeDeleted,
        Case::RestoreNewerRemote,
        Case::PropagateDeletion,
        Case::RestoreRemoteOnConflict,
        Case::DeleteOnConflict,
        Case::PropagateStaleDeletion,
    ];

    /// Returns true if this case is reached only through a decision.
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            Case::KeepLocalOnConflict
                | Case::TakeRemoteOnConflict
                | Case::AcceptRemoteDeletion
                | Case::ResurrectLocal
                | Case::RestoreRemoteOnConflict
                | Case::DeleteOnConflict
        )
    }
}

/// Relation between a local record and its pulled server record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// The server has no record with this identifier.
    Absent,
    /// The server has one.
    Present {
        /// Local revision compared to the server's.
        order: Ordering,
        /// Whether the contents are equal.
        equal: bool,
    },
}

/// Everything the classification looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The local record was never synchronized.
    pub provisional: bool,
    /// The local record carries a tombstone.
    pub tombstoned: bool,
    /// Relation to the server record.
    pub mirror: MirrorState,
}

impl Observation {
    /// Observes a local record against its pulled counterpart.
    pub fn of(local: &TaskRecord, remote: Option<&TaskRecord>, tombstoned: bool) -> Self {
        Self {
            provisional: local.is_new(),
            tombstoned,
            mirror: match remote {
                None => MirrorState::Absent,
                Some(remote) => MirrorState::Present {
                    order: local.revision.cmp(&remote.revision),
                    equal: local.same_content(remote),
                },
            },
        }
    }
}

/// Outcome of classifying an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The case follows from the observation.
    Resolved(Case),
    /// A decision is needed.
    Ask {
        /// Case applied on [`Resolution::PickLocal`].
        on_local: Case,
        /// Case applied on [`Resolution::PickRemote`].
        on_remote: Case,
    },
}

impl Classification {
    /// Selects the case for a resolution.
    pub fn with(self, resolution: Resolution) -> Case {
        match (self, resolution) {
            (Classification::Resolved(case), _) => case,
            (Classification::Ask { on_local, .. }, Resolution::PickLocal) => on_local,
            (Classification::Ask { on_remote, .. }, Resolution::PickRemote) => on_remote,
        }
    }
}

/// Maps an observation to its case.
pub fn classify(observation: &Observation) -> Classification {
    use Classification::{Ask, Resolved};
    use MirrorState::{Absent, Present};
    use Ordering::{Equal, Greater, Less};

    if observation.provisional {
        return Resolved(Case::StageNew);
    }
    match (observation.tombstoned, observation.mirror) {
        (false, Present { order: Greater, equal: true }) => Resolved(Case::AlreadyInSync),
        (false, Present { order: Greater, equal: false }) => Resolved(Case::PushLocalEdits),
        (false, Present { order: Less, .. }) => Resolved(Case::AdoptRemote),
        (false, Present { order: Equal, equal: true }) => Resolved(Case::ConfirmInSync),
        (false, Present { order: Equal, equal: false }) => Ask {
            on_local: Case::KeepLocalOnConflict,
            on_remote: Case::TakeRemoteOnConflict,
        },
        (false, Absent) => Ask {
            on_local: Case::ResurrectLocal,
            on_remote: Case::AcceptRemoteDeletion,
        },
        (true, Absent) => Resolved(Case::PurgeDeleted),
        (true, Present { order: Less, .. }) => Resolved(Case::RestoreNewerRemote),
        (true, Present { order: Equal, equal: true }) => Resolved(Case::PropagateDeletion),
        (true, Present { order: Equal, equal: false }) => Ask {
            on_local: Case::DeleteOnConflict,
            on_remote: Case::RestoreRemoteOnConflict,
        },
        (true, Present { order: Greater, .. }) => Resolved(Case::PropagateStaleDeletion),
    }
}

/// Breaks conflicts the revisions cannot settle.
///
/// Called synchronously from the reconciliation pass, which waits for the
/// answer.
pub trait DecisionMaker {
    /// Picks a side.
    fn decide(&mut self, conflict: &Conflict) -> SyncResult<Resolution>;
}

impl DecisionMaker for ConflictPolicy {
    fn decide(&mut self, conflict: &Conflict) -> SyncResult<Resolution> {
        Ok(self.resolve(conflict))
    }
}

/// Counts of a finished reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// How often each case was applied.
    pub cases: BTreeMap<Case, usize>,
    /// Provisional records given final identifiers.
    pub adjusted: usize,
    /// Server records imported as new local records.
    pub imported: usize,
}

impl ReconcileReport {
    /// Number of times `case` was applied.
    pub fn count(&self, case: Case) -> usize {
        self.cases.get(&case).copied().unwrap_or(0)
    }

    /// Number of records reconciled.
    pub fn records(&self) -> usize {
        self.cases.values().sum()
    }
}

/// Runs the reconciliation pass against a store.
pub struct Reconciler<'a, S: TaskStore + ?Sized> {
    store: &'a mut S,
    decisions: &'a mut dyn DecisionMaker,
}

impl<'a, S: TaskStore + ?Sized> Reconciler<'a, S> {
    /// Creates a reconciler.
    pub fn new(store: &'a mut S, decisions: &'a mut dyn DecisionMaker) -> Self {
        Self { store, decisions }
    }

    /// Reconciles every local record, then assigns final identifiers to
    /// provisional records and imports unknown server records.
    ///
    /// `on_record(done, total)` is called after each record.
    pub fn run(&mut self, mut on_record: impl FnMut(usize, usize)) -> SyncResult<ReconcileReport> {
        let locals = self.store.list_local_including_deleted()?;
        let total = locals.len();
        let mut report = ReconcileReport::default();

        for (done, local) in locals.iter().enumerate() {
            let case = self.reconcile_record(local)?;
            *report.cases.entry(case).or_insert(0) += 1;
            on_record(done + 1, total);
        }

        report.adjusted = self.store.adjust_provisional_identifiers()?;
        report.imported = self.store.import_unknown_mirror_entries_as_local()?;
        Ok(report)
    }

    /// Classifies one local record and applies its case.
    pub fn reconcile_record(&mut self, local: &TaskRecord) -> SyncResult<Case> {
        let remote = if local.is_new() {
            None
        } else {
            self.store.get_remote_mirror(local.id)?
        };
        let tombstoned = self.store.is_tombstoned(local.id)?;
        let observation = Observation::of(local, remote.as_ref(), tombstoned);

        let case = match classify(&observation) {
            Classification::Resolved(case) => case,
            ask => {
                let conflict = conflict_for(local, remote.as_ref(), tombstoned)?;
                let resolution = self.decisions.decide(&conflict)?;
                ask.with(resolution)
            }
        };

        self.apply(case, local, remote.as_ref())?;
        tracing::debug!(id = local.id, ?case, "reconciled record");
        Ok(case)
    }

    fn apply(&mut self, case: Case, local: &TaskRecord, remote: Option<&TaskRecord>) -> SyncResult<()> {
        let store = &mut *self.store;
        let id = local.id;
        match case {
            Case::StageNew => store.insert_provisional_to_mirror(local),
            Case::AlreadyInSync => store.remove_remote_mirror_entry(id),
            Case::PushLocalEdits => {
                let bumped = local.clone().with_revision(advance(local, 1)?);
                store.stage_outbound_diff(pulled(remote)?, &bumped)?;
                store.bump_local_revision(id, bumped.revision)
            }
            Case::AdoptRemote | Case::TakeRemoteOnConflict => {
                store.replace_local_with_remote(pulled(remote)?)?;
                store.remove_remote_mirror_entry(id)
            }
            Case::ConfirmInSync => {
                let revision = advance(local, 1)?;
                store.remove_remote_mirror_entry(id)?;
                store.bump_local_revision(id, revision)
            }
            Case::KeepLocalOnConflict => {
                let bumped = local.clone().with_revision(advance(local, 2)?);
                store.bump_local_revision(id, bumped.revision)?;
                store.stage_outbound_diff(pulled(remote)?, &bumped)
            }
            Case::AcceptRemoteDeletion | Case::PurgeDeleted => store.delete_local_permanently(id),
            Case::ResurrectLocal => {
                let bumped = local.clone().with_revision(advance(local, 1)?);
                store.insert_provisional_to_mirror(&bumped)?;
                store.bump_local_revision(id, bumped.revision)
            }
            Case::RestoreNewerRemote | Case::RestoreRemoteOnConflict => {
                store.replace_local_with_remote(pulled(remote)?)?;
                store.remove_remote_mirror_entry(id)
            }
            Case::PropagateDeletion | Case::DeleteOnConflict | Case::PropagateStaleDeletion => {
                store.delete_local_permanently(id)?;
                store.stage_outbound_deletion(id)
            }
        }
    }
}

/// Revision `local` reaches after `by` more edits.
fn advance(local: &TaskRecord, by: i32) -> SyncResult<i32> {
    local.revision.checked_add(by).ok_or_else(|| {
        SyncError::Protocol(format!(
            "revision {} of record {} cannot advance by {by}",
            local.revision, local.id
        ))
    })
}

fn pulled(remote: Option<&TaskRecord>) -> SyncResult<&TaskRecord> {
    remote.ok_or_else(|| SyncError::storage("mirror entry vanished during reconciliation"))
}

fn conflict_for(
    local: &TaskRecord,
    remote: Option<&TaskRecord>,
    tombstoned: bool,
) -> SyncResult<Conflict> {
    Ok(match (remote, tombstoned) {
        (None, _) => Conflict::RemoteDeleted {
            local: local.clone(),
        },
        (Some(remote), true) => Conflict::LocalDeleted {
            remote: remote.clone(),
        },
        (Some(remote), false) => Conflict::Diverged {
            local: local.clone(),
            remote: remote.clone(),
        },
    })
}
