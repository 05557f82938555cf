//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A chunk header or payload does not fit the buffer, or a chunk
    /// carries a tag that is not allowed where it appears.
    #[error("malformed chunk at offset {offset}: {message}")]
    MalformedChunk {
        /// Byte offset of the offending chunk header.
        offset: usize,
        /// Description of the violation.
        message: String,
    },

    /// A record container decoded without one of its mandatory fields.
    #[error("incomplete record: missing {missing}")]
    IncompleteRecord {
        /// Name of the first missing field.
        missing: &'static str,
    },

    /// A payload is longer than the 16-bit length field can describe.
    #[error("payload of {len} bytes exceeds the 65535 byte chunk limit")]
    PayloadTooLarge {
        /// Length of the rejected payload.
        len: usize,
    },

    /// A numeric field does not fit its 32-bit wire representation.
    #[error("value {value} of field {field} does not fit in 32 bits")]
    ValueOutOfRange {
        /// Name of the field.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// A text chunk is not valid UTF-8.
    #[error("chunk with tag {tag} is not valid UTF-8")]
    InvalidUtf8 {
        /// Tag of the offending chunk.
        tag: u8,
    },
}

impl CodecError {
    /// Create a malformed chunk error.
    pub fn malformed(offset: usize, message: impl Into<String>) -> Self {
        Self::MalformedChunk {
            offset,
            message: message.into(),
        }
    }

    /// Create an incomplete record error.
    pub fn incomplete(missing: &'static str) -> Self {
        Self::IncompleteRecord { missing }
    }

    /// Returns true for violations of the chunk framing or record layout.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            CodecError::MalformedChunk { .. }
                | CodecError::IncompleteRecord { .. }
                | CodecError::InvalidUtf8 { .. }
        )
    }
}
