//! Sync payloads: the server snapshot and the outbound changeset.

use crate::mirror::MirrorRecord;
use crate::record::{wire_id, TaskRecord};
use crate::tags::{FieldTag, RecordKind};
use todosync_codec::{decode, ChunkDecoder, ChunkEncoder, CodecError, CodecResult};

/// Encodes the server's record set as a sequence of `CHUNK_TODO` records.
pub fn encode_snapshot(records: &[TaskRecord]) -> CodecResult<Vec<u8>> {
    let mut encoder = ChunkEncoder::new();
    for record in records {
        record.encode_into(RecordKind::Todo, &mut encoder)?;
    }
    Ok(encoder.into_bytes())
}

/// Decodes a server snapshot lazily, one record per iteration.
pub fn decode_snapshot(bytes: &[u8]) -> SnapshotDecoder<'_> {
    SnapshotDecoder {
        chunks: decode(bytes),
    }
}

/// Iterator over the records of a server snapshot.
///
/// Every top-level chunk must be a `CHUNK_TODO` container holding a
/// complete record.
#[derive(Debug, Clone)]
pub struct SnapshotDecoder<'a> {
    chunks: ChunkDecoder<'a>,
}

impl SnapshotDecoder<'_> {
    /// Number of payload bytes consumed so far.
    pub fn position(&self) -> usize {
        self.chunks.position()
    }
}

impl Iterator for SnapshotDecoder<'_> {
    type Item = CodecResult<TaskRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = match self.chunks.next()? {
            Ok(chunk) => chunk,
            Err(e) => return Some(Err(e)),
        };
        if chunk.tag != RecordKind::Todo.to_code() {
            return Some(Err(CodecError::malformed(
                chunk.offset,
                format!("expected CHUNK_TODO, found tag {}", chunk.tag),
            )));
        }
        Some(TaskRecord::decode_fields(&chunk))
    }
}

/// The changes a client pushes to the server.
///
/// Encoded as all new records, then all deletions, then all updates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Changeset {
    /// Records the server has never seen.
    pub new: Vec<TaskRecord>,
    /// Identifiers of records to delete.
    pub deleted: Vec<i64>,
    /// Partial updates of existing records.
    pub updated: Vec<MirrorRecord>,
}

impl Changeset {
    /// Creates an empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if there is nothing to push.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }

    /// Total number of records in the changeset.
    pub fn len(&self) -> usize {
        self.new.len() + self.deleted.len() + self.updated.len()
    }

    /// Encodes the changeset in a single pass.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut encoder = ChunkEncoder::new();
        for record in &self.new {
            record.encode_into(RecordKind::New, &mut encoder)?;
        }
        for id in &self.deleted {
            let wire = wire_id(*id)?;
            let mark = encoder.begin_record(RecordKind::Delete.to_code());
            encoder.put_i32(FieldTag::Id.to_code(), wire);
            encoder.finish_record(mark)?;
        }
        for update in &self.updated {
            update.encode_into(RecordKind::Update, &mut encoder)?;
        }
        Ok(encoder.into_bytes())
    }

    /// Decodes a pushed changeset.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut changeset = Self::new();
        for chunk in decode(bytes) {
            let chunk = chunk?;
            match RecordKind::from_code(chunk.tag) {
                Some(RecordKind::New) => changeset.new.push(TaskRecord::decode_fields(&chunk)?),
                Some(RecordKind::Delete) => {
                    changeset
                        .deleted
                        .push(MirrorRecord::decode_fields(&chunk)?.id);
                }
                Some(RecordKind::Update) => changeset
                    .updated
                    .push(MirrorRecord::decode_fields(&chunk)?),
                Some(RecordKind::Todo) | None => {
                    return Err(CodecError::malformed(
                        chunk.offset,
                        format!("unexpected container tag {} in changeset", chunk.tag),
                    ));
                }
            }
        }
        Ok(changeset)
    }
}
