//! Conflicts the reconciliation pass cannot settle from revisions alone.

use crate::record::TaskRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A genuine conflict between the local replica and the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Both sides edited the record to different content at the same
    /// revision.
    Diverged {
        /// Local record.
        local: TaskRecord,
        /// Server record.
        remote: TaskRecord,
    },
    /// The server no longer holds a record that exists locally.
    RemoteDeleted {
        /// Local record.
        local: TaskRecord,
    },
    /// The record was deleted locally while the server holds a different
    /// version at the same revision.
    LocalDeleted {
        /// Server record.
        remote: TaskRecord,
    },
}

impl Conflict {
    /// Local side of the conflict, if any.
    pub fn local(&self) -> Option<&TaskRecord> {
        match self {
            Conflict::Diverged { local, .. } | Conflict::RemoteDeleted { local } => Some(local),
            Conflict::LocalDeleted { .. } => None,
        }
    }

    /// Server side of the conflict, if any.
    pub fn remote(&self) -> Option<&TaskRecord> {
        match self {
            Conflict::Diverged { remote, .. } | Conflict::LocalDeleted { remote } => Some(remote),
            Conflict::RemoteDeleted { .. } => None,
        }
    }

    /// Identifier of the conflicting record.
    pub fn id(&self) -> i64 {
        match self {
            Conflict::Diverged { local, .. } | Conflict::RemoteDeleted { local } => local.id,
            Conflict::LocalDeleted { remote } => remote.id,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::Diverged { local, remote } => write!(
                f,
                "record {} changed on both sides: local '{}', server '{}'",
                local.id, local.title, remote.title
            ),
            Conflict::RemoteDeleted { local } => write!(
                f,
                "record {} ('{}') is missing on the server",
                local.id, local.title
            ),
            Conflict::LocalDeleted { remote } => write!(
                f,
                "record {} ('{}') was deleted locally but changed on the server",
                remote.id, remote.title
            ),
        }
    }
}

/// Answer to a [`Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Keep the local side.
    PickLocal,
    /// Keep the server side.
    PickRemote,
}

/// A fixed answer applied to every conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Always keep the local side.
    PreferLocal,
    /// Always keep the server side.
    #[default]
    PreferRemote,
}

impl ConflictPolicy {
    /// Resolves a conflict according to this policy.
    pub fn resolve(&self, _conflict: &Conflict) -> Resolution {
        match self {
            ConflictPolicy::PreferLocal => Resolution::PickLocal,
            ConflictPolicy::PreferRemote => Resolution::PickRemote,
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ConflictPolicy::PreferLocal),
            "remote" | "server" => Ok(ConflictPolicy::PreferRemote),
            other => Err(format!("unknown conflict policy '{other}'")),
        }
    }
}
