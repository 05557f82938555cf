//! Task records.

use crate::tags::{FieldTag, RecordKind};
use serde::{Deserialize, Serialize};
use todosync_codec::{Chunk, ChunkEncoder, CodecError, CodecResult};

/// Revision of a record that has never been synchronized.
pub const NEW_REVISION: i32 = -1;

/// A single todo item.
///
/// The identifier is assigned by the server. Until the first successful
/// sync a record carries a negative placeholder identifier and
/// [`NEW_REVISION`].
///
/// Equality for conflict purposes is [`same_content`](Self::same_content):
/// it ignores `id` and `revision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Record identifier.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Deadline as `YYYY-MM-DD`.
    pub deadline: String,
    /// Priority.
    pub priority: i32,
    /// Status.
    pub status: String,
    /// Description; empty when absent.
    #[serde(default)]
    pub description: String,
    /// Revision counter.
    pub revision: i32,
}

impl TaskRecord {
    /// Creates a record that has not been synchronized yet.
    pub fn draft(
        title: impl Into<String>,
        deadline: impl Into<String>,
        priority: i32,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            title: title.into(),
            deadline: deadline.into(),
            priority,
            status: status.into(),
            description: String::new(),
            revision: NEW_REVISION,
        }
    }

    /// Sets the identifier.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the revision.
    pub fn with_revision(mut self, revision: i32) -> Self {
        self.revision = revision;
        self
    }

    /// Returns true if this record has never been synchronized.
    pub fn is_new(&self) -> bool {
        self.revision == NEW_REVISION
    }

    /// Compares title, deadline, priority, status and description.
    pub fn same_content(&self, other: &TaskRecord) -> bool {
        self.title == other.title
            && self.deadline == other.deadline
            && self.priority == other.priority
            && self.status == other.status
            && self.description == other.description
    }

    /// Encodes this record as a container chunk with all seven fields.
    pub fn encode(&self, kind: RecordKind) -> CodecResult<Vec<u8>> {
        let mut encoder = ChunkEncoder::new();
        self.encode_into(kind, &mut encoder)?;
        Ok(encoder.into_bytes())
    }

    /// Appends this record as a container chunk with all seven fields.
    pub fn encode_into(&self, kind: RecordKind, encoder: &mut ChunkEncoder) -> CodecResult<()> {
        let id = wire_id(self.id)?;
        let mark = encoder.begin_record(kind.to_code());
        encoder.put_i32(FieldTag::Id.to_code(), id);
        encoder.put_str(FieldTag::Title.to_code(), &self.title)?;
        encoder.put_str(FieldTag::Deadline.to_code(), &self.deadline)?;
        encoder.put_i32(FieldTag::Priority.to_code(), self.priority);
        encoder.put_str(FieldTag::Status.to_code(), &self.status)?;
        encoder.put_str(FieldTag::Description.to_code(), &self.description)?;
        encoder.put_i32(FieldTag::Revision.to_code(), self.revision);
        encoder.finish_record(mark)
    }

    /// Decodes the fields of a record container chunk.
    ///
    /// # Errors
    ///
    /// Fails with [`CodecError::MalformedChunk`] on an unknown field tag or a
    /// bad field width, and with [`CodecError::IncompleteRecord`] unless all
    /// seven fields are present.
    pub fn decode_fields(chunk: &Chunk<'_>) -> CodecResult<Self> {
        let fields = RecordFields::read(chunk)?;
        Ok(Self {
            id: i64::from(fields.id.ok_or(missing(FieldTag::Id))?),
            title: fields.title.ok_or(missing(FieldTag::Title))?,
            deadline: fields.deadline.ok_or(missing(FieldTag::Deadline))?,
            priority: fields.priority.ok_or(missing(FieldTag::Priority))?,
            status: fields.status.ok_or(missing(FieldTag::Status))?,
            description: fields.description.ok_or(missing(FieldTag::Description))?,
            revision: fields.revision.ok_or(missing(FieldTag::Revision))?,
        })
    }
}

/// Error for a record container lacking `field`.
pub(crate) fn missing(field: FieldTag) -> CodecError {
    CodecError::incomplete(field.name())
}

/// Converts a model identifier to its 32-bit wire form.
pub(crate) fn wire_id(id: i64) -> CodecResult<i32> {
    i32::try_from(id).map_err(|_| CodecError::ValueOutOfRange {
        field: "id",
        value: id,
    })
}

/// Fields of a record container, each possibly absent.
#[derive(Debug, Default)]
pub(crate) struct RecordFields {
    pub id: Option<i32>,
    pub title: Option<String>,
    pub deadline: Option<String>,
    pub priority: Option<i32>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub revision: Option<i32>,
}

impl RecordFields {
    /// Reads every field chunk of a container. A repeated field keeps the
    /// last value.
    pub fn read(chunk: &Chunk<'_>) -> CodecResult<Self> {
        let mut fields = Self::default();
        for child in chunk.children() {
            let child = child?;
            let tag = FieldTag::from_code(child.tag).ok_or_else(|| {
                CodecError::malformed(
                    child.offset,
                    format!("unexpected sub-tag {} in record container", child.tag),
                )
            })?;
            match tag {
                FieldTag::Id => fields.id = Some(child.read_i32()?),
                FieldTag::Title => fields.title = Some(child.read_str()?.to_owned()),
                FieldTag::Deadline => fields.deadline = Some(child.read_str()?.to_owned()),
                FieldTag::Priority => fields.priority = Some(child.read_i32()?),
                FieldTag::Status => fields.status = Some(child.read_str()?.to_owned()),
                FieldTag::Description => {
                    fields.description = Some(child.read_str()?.to_owned());
                }
                FieldTag::Revision => fields.revision = Some(child.read_i32()?),
            }
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todosync_codec::decode;

    fn milk() -> TaskRecord {
        TaskRecord::draft("Buy milk", "2024-03-01", 2, "open")
            .with_id(7)
            .with_description("two litres")
            .with_revision(3)
    }

    #[test]
    fn roundtrip() {
        let record = milk();
        let bytes = record.encode(RecordKind::Todo).unwrap();
        let chunk = decode(&bytes).next().unwrap().unwrap();
        assert_eq!(chunk.tag, RecordKind::Todo.to_code());
        assert_eq!(TaskRecord::decode_fields(&chunk).unwrap(), record);
    }

    #[test]
    fn encodes_seven_sub_chunks_in_order() {
        let bytes = TaskRecord::draft("Buy milk", "2024-03-01", 1, "open")
            .with_id(-1)
            .encode(RecordKind::New)
            .unwrap();
        let chunk = decode(&bytes).next().unwrap().unwrap();
        let tags: Vec<u8> = chunk.children().map(|c| c.unwrap().tag).collect();
        assert_eq!(tags, vec![5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn same_content_ignores_id_and_revision() {
        let a = milk();
        let b = milk().with_id(99).with_revision(12);
        assert!(a.same_content(&b));
        assert_ne!(a, b);

        let mut c = milk();
        c.priority = 5;
        assert!(!a.same_content(&c));
    }

    #[test]
    fn is_new() {
        assert!(TaskRecord::draft("t", "2024-01-01", 1, "open").is_new());
        assert!(!milk().is_new());
    }

    #[test]
    fn missing_revision_is_incomplete() {
        let mut encoder = ChunkEncoder::new();
        let mark = encoder.begin_record(RecordKind::Todo.to_code());
        encoder.put_i32(5, 1);
        encoder.put_str(6, "t").unwrap();
        encoder.put_str(7, "2024-01-01").unwrap();
        encoder.put_i32(8, 1);
        encoder.put_str(9, "open").unwrap();
        encoder.put_str(10, "").unwrap();
        encoder.finish_record(mark).unwrap();
        let bytes = encoder.into_bytes();

        let chunk = decode(&bytes).next().unwrap().unwrap();
        assert_eq!(
            TaskRecord::decode_fields(&chunk),
            Err(CodecError::incomplete("revision"))
        );
    }

    #[test]
    fn unknown_sub_tag_is_malformed() {
        let mut encoder = ChunkEncoder::new();
        let mark = encoder.begin_record(RecordKind::Todo.to_code());
        encoder.put_i32(5, 1);
        encoder.put_i32(42, 1);
        encoder.finish_record(mark).unwrap();
        let bytes = encoder.into_bytes();

        let chunk = decode(&bytes).next().unwrap().unwrap();
        assert!(matches!(
            TaskRecord::decode_fields(&chunk),
            Err(CodecError::MalformedChunk { offset: 10, .. })
        ));
    }

    #[test]
    fn identifier_must_fit_wire_width() {
        let record = milk().with_id(i64::from(i32::MAX) + 1);
        assert!(matches!(
            record.encode(RecordKind::Todo),
            Err(CodecError::ValueOutOfRange { field: "id", .. })
        ));
    }
}
