//! # todosync Protocol
//!
//! Record model and wire vocabulary for todosync.
//!
//! This crate provides:
//! - `TaskRecord` and `MirrorRecord`, the values exchanged and staged
//! - Chunk tags for record containers and their fields
//! - Datagram `Frame`s for every protocol phase
//! - Snapshot and `Changeset` payload encoding/decoding
//! - `Conflict`, `Resolution` and `ConflictPolicy`
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changeset;
mod conflict;
mod frame;
mod mirror;
mod record;
mod tags;

pub use changeset::{decode_snapshot, encode_snapshot, Changeset, SnapshotDecoder};
pub use conflict::{Conflict, ConflictPolicy, Resolution};
pub use frame::{
    announced_len, announced_payload_len, Frame, FrameType, LONG_FRAME_LEN, SHORT_FRAME_LEN,
};
pub use mirror::MirrorRecord;
pub use record::{TaskRecord, NEW_REVISION};
pub use tags::{FieldTag, RecordKind};

/// Default UDP port of a todosync server.
pub const DEFAULT_PORT: u16 = 50001;
