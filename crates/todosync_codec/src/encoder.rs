//! TLV chunk encoder.

use crate::error::{CodecError, CodecResult};
use crate::{HEADER_LEN, MAX_PAYLOAD_LEN};
use bytes::{BufMut, BytesMut};

/// Encode a single chunk: tag byte, 16-bit big-endian length, payload.
///
/// # Errors
///
/// Returns [`CodecError::PayloadTooLarge`] if the payload is longer than
/// 65535 bytes.
pub fn encode_chunk(tag: u8, payload: &[u8]) -> CodecResult<Vec<u8>> {
    let mut encoder = ChunkEncoder::with_capacity(HEADER_LEN + payload.len());
    encoder.put_chunk(tag, payload)?;
    Ok(encoder.into_bytes())
}

/// Encode a record: an outer chunk whose payload is the concatenation of
/// the given `(sub-tag, payload)` chunks, in order.
///
/// # Errors
///
/// Returns [`CodecError::PayloadTooLarge`] if any sub-chunk or the outer
/// chunk would exceed the 16-bit length field.
pub fn encode_record(tag: u8, fields: &[(u8, &[u8])]) -> CodecResult<Vec<u8>> {
    let inner: usize = fields.iter().map(|(_, p)| HEADER_LEN + p.len()).sum();
    let mut encoder = ChunkEncoder::with_capacity(HEADER_LEN + inner);
    encoder.put_record(tag, fields)?;
    Ok(encoder.into_bytes())
}

/// A growable chunk encoder.
///
/// Records are written in a single pass: [`begin_record`](Self::begin_record)
/// reserves the outer header and [`finish_record`](Self::finish_record)
/// patches its length once the sub-chunks are in place, so no separate
/// size computation is needed.
#[derive(Debug, Default)]
pub struct ChunkEncoder {
    buffer: BytesMut,
}

/// Position of an open record header, returned by
/// [`ChunkEncoder::begin_record`].
#[derive(Debug)]
#[must_use = "an open record must be finished"]
pub struct RecordMark {
    header_pos: usize,
}

impl ChunkEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Append one chunk.
    pub fn put_chunk(&mut self, tag: u8, payload: &[u8]) -> CodecResult<()> {
        let len = checked_len(payload.len())?;
        self.buffer.put_u8(tag);
        self.buffer.put_u16(len);
        self.buffer.put_slice(payload);
        Ok(())
    }

    /// Append a chunk carrying a 4-byte big-endian signed integer.
    pub fn put_i32(&mut self, tag: u8, value: i32) {
        self.buffer.put_u8(tag);
        self.buffer.put_u16(4);
        self.buffer.put_i32(value);
    }

    /// Append a chunk carrying UTF-8 text.
    pub fn put_str(&mut self, tag: u8, value: &str) -> CodecResult<()> {
        self.put_chunk(tag, value.as_bytes())
    }

    /// Append a complete record built from `(sub-tag, payload)` pairs.
    pub fn put_record(&mut self, tag: u8, fields: &[(u8, &[u8])]) -> CodecResult<()> {
        let mark = self.begin_record(tag);
        for (sub_tag, payload) in fields {
            self.put_chunk(*sub_tag, payload)?;
        }
        self.finish_record(mark)
    }

    /// Write a record header with a placeholder length.
    pub fn begin_record(&mut self, tag: u8) -> RecordMark {
        let header_pos = self.buffer.len();
        self.buffer.put_u8(tag);
        self.buffer.put_u16(0);
        RecordMark { header_pos }
    }

    /// Patch the length of a record opened with [`begin_record`](Self::begin_record).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PayloadTooLarge`] if the sub-chunks written
    /// since the mark exceed 65535 bytes.
    pub fn finish_record(&mut self, mark: RecordMark) -> CodecResult<()> {
        let payload_start = mark.header_pos + HEADER_LEN;
        let len = checked_len(self.buffer.len() - payload_start)?;
        self.buffer[mark.header_pos + 1..payload_start].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn checked_len(len: usize) -> CodecResult<u16> {
    if len > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge { len });
    }
    Ok(len as u16)
}
