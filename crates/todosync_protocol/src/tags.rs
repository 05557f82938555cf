//! Chunk tags used inside sync payloads.

/// Tag of a record container chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A record the server has never seen.
    New,
    /// A partial update of an existing record.
    Update,
    /// Deletion of an existing record.
    Delete,
    /// A record as currently stored on the server.
    Todo,
}

impl RecordKind {
    /// Converts to the wire tag.
    pub fn to_code(&self) -> u8 {
        match self {
            RecordKind::New => 1,
            RecordKind::Update => 2,
            RecordKind::Delete => 3,
            RecordKind::Todo => 4,
        }
    }

    /// Converts from the wire tag.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RecordKind::New),
            2 => Some(RecordKind::Update),
            3 => Some(RecordKind::Delete),
            4 => Some(RecordKind::Todo),
            _ => None,
        }
    }
}

/// Tag of a field chunk inside a record container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    /// Record identifier (4-byte signed integer).
    Id,
    /// Title (UTF-8).
    Title,
    /// Deadline, `YYYY-MM-DD` (UTF-8).
    Deadline,
    /// Priority (4-byte signed integer).
    Priority,
    /// Status (UTF-8).
    Status,
    /// Description (UTF-8).
    Description,
    /// Revision (4-byte signed integer).
    Revision,
}

impl FieldTag {
    /// All field tags in wire order.
    pub const ALL: [FieldTag; 7] = [
        FieldTag::Id,
        FieldTag::Title,
        FieldTag::Deadline,
        FieldTag::Priority,
        FieldTag::Status,
        FieldTag::Description,
        FieldTag::Revision,
    ];

    /// Converts to the wire tag.
    pub fn to_code(&self) -> u8 {
        match self {
            FieldTag::Id => 5,
            FieldTag::Title => 6,
            FieldTag::Deadline => 7,
            FieldTag::Priority => 8,
            FieldTag::Status => 9,
            FieldTag::Description => 10,
            FieldTag::Revision => 11,
        }
    }

    /// Converts from the wire tag.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            5 => Some(FieldTag::Id),
            6 => Some(FieldTag::Title),
            7 => Some(FieldTag::Deadline),
            8 => Some(FieldTag::Priority),
            9 => Some(FieldTag::Status),
            10 => Some(FieldTag::Description),
            11 => Some(FieldTag::Revision),
            _ => None,
        }
    }

    /// Field name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FieldTag::Id => "id",
            FieldTag::Title => "title",
            FieldTag::Deadline => "deadline",
            FieldTag::Priority => "priority",
            FieldTag::Status => "status",
            FieldTag::Description => "description",
            FieldTag::Revision => "revision",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_codes() {
        for code in 1..=4 {
            let kind = RecordKind::from_code(code).unwrap();
            assert_eq!(kind.to_code(), code);
        }
        assert_eq!(RecordKind::from_code(0), None);
        assert_eq!(RecordKind::from_code(5), None);
    }

    #[test]
    fn field_tag_codes() {
        let codes: Vec<u8> = FieldTag::ALL.iter().map(FieldTag::to_code).collect();
        assert_eq!(codes, vec![5, 6, 7, 8, 9, 10, 11]);
        for tag in FieldTag::ALL {
            assert_eq!(FieldTag::from_code(tag.to_code()), Some(tag));
        }
        assert_eq!(FieldTag::from_code(4), None);
        assert_eq!(FieldTag::from_code(12), None);
    }
}
