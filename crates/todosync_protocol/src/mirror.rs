//! Partial records describing a change to push.

use crate::record::{missing, wire_id, RecordFields, TaskRecord};
use crate::tags::{FieldTag, RecordKind};
use todosync_codec::{Chunk, ChunkEncoder, CodecResult};

/// A record in which every field but the identifier may be unset.
///
/// An unset field means "unchanged relative to the record it is compared
/// against". With every field and the revision unset the record denotes a
/// deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorRecord {
    /// Record identifier.
    pub id: i64,
    /// New title, if changed.
    pub title: Option<String>,
    /// New deadline, if changed.
    pub deadline: Option<String>,
    /// New priority, if changed.
    pub priority: Option<i32>,
    /// New status, if changed.
    pub status: Option<String>,
    /// New description, if changed.
    pub description: Option<String>,
    /// Revision to adopt.
    pub revision: Option<i32>,
}

impl MirrorRecord {
    /// Creates a deletion marker.
    pub fn deletion(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Creates a record with every field set from `record`.
    pub fn full(record: &TaskRecord) -> Self {
        Self {
            id: record.id,
            title: Some(record.title.clone()),
            deadline: Some(record.deadline.clone()),
            priority: Some(record.priority),
            status: Some(record.status.clone()),
            description: Some(record.description.clone()),
            revision: Some(record.revision),
        }
    }

    /// Builds the change that turns `remote` into `local`.
    ///
    /// Only fields that differ are set; the revision is always taken from
    /// `local`.
    pub fn diff(remote: &TaskRecord, local: &TaskRecord) -> Self {
        fn changed<T: PartialEq + Clone>(remote: &T, local: &T) -> Option<T> {
            (remote != local).then(|| local.clone())
        }

        Self {
            id: local.id,
            title: changed(&remote.title, &local.title),
            deadline: changed(&remote.deadline, &local.deadline),
            priority: changed(&remote.priority, &local.priority),
            status: changed(&remote.status, &local.status),
            description: changed(&remote.description, &local.description),
            revision: Some(local.revision),
        }
    }

    /// Returns true if this record denotes a deletion.
    pub fn is_deletion(&self) -> bool {
        self.title.is_none()
            && self.deadline.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.description.is_none()
            && self.revision.is_none()
    }

    /// Number of set fields, identifier excluded.
    pub fn changed_fields(&self) -> usize {
        [
            self.title.is_some(),
            self.deadline.is_some(),
            self.priority.is_some(),
            self.status.is_some(),
            self.description.is_some(),
            self.revision.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Applies every set field to `record`.
    pub fn apply_to(&self, record: &mut TaskRecord) {
        if let Some(title) = &self.title {
            record.title.clone_from(title);
        }
        if let Some(deadline) = &self.deadline {
            record.deadline.clone_from(deadline);
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(status) = &self.status {
            record.status.clone_from(status);
        }
        if let Some(description) = &self.description {
            record.description.clone_from(description);
        }
        if let Some(revision) = self.revision {
            record.revision = revision;
        }
    }

    /// Appends this record as a container chunk holding the identifier and
    /// every set field, in wire order.
    pub fn encode_into(&self, kind: RecordKind, encoder: &mut ChunkEncoder) -> CodecResult<()> {
        let id = wire_id(self.id)?;
        let mark = encoder.begin_record(kind.to_code());
        encoder.put_i32(FieldTag::Id.to_code(), id);
        if let Some(title) = &self.title {
            encoder.put_str(FieldTag::Title.to_code(), title)?;
        }
        if let Some(deadline) = &self.deadline {
            encoder.put_str(FieldTag::Deadline.to_code(), deadline)?;
        }
        if let Some(priority) = self.priority {
            encoder.put_i32(FieldTag::Priority.to_code(), priority);
        }
        if let Some(status) = &self.status {
            encoder.put_str(FieldTag::Status.to_code(), status)?;
        }
        if let Some(description) = &self.description {
            encoder.put_str(FieldTag::Description.to_code(), description)?;
        }
        if let Some(revision) = self.revision {
            encoder.put_i32(FieldTag::Revision.to_code(), revision);
        }
        encoder.finish_record(mark)
    }

    /// Decodes a container chunk in which only the identifier is mandatory.
    pub fn decode_fields(chunk: &Chunk<'_>) -> CodecResult<Self> {
        let fields = RecordFields::read(chunk)?;
        Ok(Self {
            id: i64::from(fields.id.ok_or(missing(FieldTag::Id))?),
            title: fields.title,
            deadline: fields.deadline,
            priority: fields.priority,
            status: fields.status,
            description: fields.description,
            revision: fields.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todosync_codec::{decode, CodecError};

    fn remote() -> TaskRecord {
        TaskRecord::draft("Buy milk", "2024-03-01", 2, "open")
            .with_id(4)
            .with_revision(2)
    }

    #[test]
    fn diff_sets_only_changed_fields() {
        let mut local = remote().with_revision(3);
        local.title = "Buy oat milk".into();

        let diff = MirrorRecord::diff(&remote(), &local);
        assert_eq!(diff.id, 4);
        assert_eq!(diff.title.as_deref(), Some("Buy oat milk"));
        assert_eq!(diff.deadline, None);
        assert_eq!(diff.priority, None);
        assert_eq!(diff.revision, Some(3));
        assert_eq!(diff.changed_fields(), 2);
        assert!(!diff.is_deletion());
    }

    #[test]
    fn applying_diff_yields_local() {
        let mut local = remote().with_revision(5);
        local.status = "done".into();
        local.description = "skimmed".into();

        let mut patched = remote();
        MirrorRecord::diff(&remote(), &local).apply_to(&mut patched);
        assert_eq!(patched, local);
    }

    #[test]
    fn deletion_marker() {
        let marker = MirrorRecord::deletion(9);
        assert!(marker.is_deletion());
        assert_eq!(marker.changed_fields(), 0);
    }

    #[test]
    fn update_chunk_carries_id_and_set_fields() {
        let mut local = remote().with_revision(3);
        local.priority = 1;
        let diff = MirrorRecord::diff(&remote(), &local);

        let mut encoder = ChunkEncoder::new();
        diff.encode_into(RecordKind::Update, &mut encoder).unwrap();
        let bytes = encoder.into_bytes();

        let chunk = decode(&bytes).next().unwrap().unwrap();
        assert_eq!(chunk.tag, 2);
        let tags: Vec<u8> = chunk.children().map(|c| c.unwrap().tag).collect();
        assert_eq!(tags, vec![5, 8, 11]);
        assert_eq!(MirrorRecord::decode_fields(&chunk).unwrap(), diff);
    }

    #[test]
    fn update_without_id_is_incomplete() {
        let mut encoder = ChunkEncoder::new();
        let mark = encoder.begin_record(RecordKind::Update.to_code());
        encoder.put_str(6, "x").unwrap();
        encoder.finish_record(mark).unwrap();
        let bytes = encoder.into_bytes();

        let chunk = decode(&bytes).next().unwrap().unwrap();
        assert_eq!(
            MirrorRecord::decode_fields(&chunk),
            Err(CodecError::incomplete("id"))
        );
    }
}
