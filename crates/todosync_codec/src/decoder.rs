//! TLV chunk decoder.

use crate::error::{CodecError, CodecResult};
use crate::HEADER_LEN;

/// Decode a buffer into a lazy sequence of chunks.
///
/// The sequence stops after the first error.
pub fn decode(bytes: &[u8]) -> ChunkDecoder<'_> {
    ChunkDecoder::new(bytes)
}

/// A single decoded chunk borrowing its payload from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Tag byte.
    pub tag: u8,
    /// Payload bytes.
    pub payload: &'a [u8],
    /// Offset of the chunk header in the outermost buffer.
    pub offset: usize,
}

impl<'a> Chunk<'a> {
    /// Total size of this chunk on the wire, header included.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Read the payload as a 4-byte big-endian signed integer.
    pub fn read_i32(&self) -> CodecResult<i32> {
        let bytes: [u8; 4] = self.payload.try_into().map_err(|_| {
            CodecError::malformed(
                self.offset,
                format!(
                    "integer chunk with tag {} has {} bytes, expected 4",
                    self.tag,
                    self.payload.len()
                ),
            )
        })?;
        Ok(i32::from_be_bytes(bytes))
    }

    /// Read the payload as UTF-8 text.
    pub fn read_str(&self) -> CodecResult<&'a str> {
        std::str::from_utf8(self.payload).map_err(|_| CodecError::InvalidUtf8 { tag: self.tag })
    }

    /// Decode the payload of this chunk as a sequence of sub-chunks.
    pub fn children(&self) -> ChunkDecoder<'a> {
        ChunkDecoder::with_base(self.payload, self.offset + HEADER_LEN)
    }
}

/// A streaming chunk decoder.
///
/// Yields one [`Chunk`] per iteration and fails with
/// [`CodecError::MalformedChunk`] when a header is truncated or a declared
/// length runs past the end of the buffer.
#[derive(Debug, Clone)]
pub struct ChunkDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
    failed: bool,
}

impl<'a> ChunkDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    fn with_base(data: &'a [u8], base: usize) -> Self {
        Self {
            data,
            pos: 0,
            base,
            failed: false,
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn next_chunk(&mut self) -> CodecResult<Chunk<'a>> {
        let offset = self.base + self.pos;
        let rest = self.remaining();
        if rest.len() < HEADER_LEN {
            return Err(CodecError::malformed(
                offset,
                format!("truncated header: {} bytes remaining", rest.len()),
            ));
        }

        let tag = rest[0];
        let len = usize::from(u16::from_be_bytes([rest[1], rest[2]]));
        let available = rest.len() - HEADER_LEN;
        if len > available {
            return Err(CodecError::malformed(
                offset,
                format!("length {len} exceeds remaining {available} bytes"),
            ));
        }

        let payload = &rest[HEADER_LEN..HEADER_LEN + len];
        self.pos += HEADER_LEN + len;
        Ok(Chunk {
            tag,
            payload,
            offset,
        })
    }
}

impl<'a> Iterator for ChunkDecoder<'a> {
    type Item = CodecResult<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.is_empty() {
            return None;
        }
        let result = self.next_chunk();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode_chunk, encode_record, ChunkEncoder};

    #[test]
    fn decodes_sequence_lazily() {
        let mut encoder = ChunkEncoder::new();
        encoder.put_str(6, "one").unwrap();
        encoder.put_i32(8, 3);
        let bytes = encoder.into_bytes();

        let mut decoder = decode(&bytes);
        let first = decoder.next().unwrap().unwrap();
        assert_eq!(first.tag, 6);
        assert_eq!(first.read_str().unwrap(), "one");
        assert_eq!(decoder.position(), 6);

        let second = decoder.next().unwrap().unwrap();
        assert_eq!(second.read_i32().unwrap(), 3);
        assert_eq!(second.offset, 6);
        assert!(decoder.next().is_none());
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        assert_eq!(decode(&[]).count(), 0);
    }

    #[test]
    fn declared_length_past_end_is_malformed() {
        let bytes = [6u8, 0, 10, b'a', b'b'];
        let result: Vec<_> = decode(&bytes).collect();
        assert_eq!(result.len(), 1);
        assert!(matches!(
            result[0],
            Err(CodecError::MalformedChunk { offset: 0, .. })
        ));
    }

    #[test]
    fn truncated_header_is_malformed() {
        let mut bytes = encode_chunk(6, b"x").unwrap();
        bytes.extend_from_slice(&[7, 0]);
        let result: Vec<_> = decode(&bytes).collect();
        assert_eq!(result.len(), 2);
        assert!(result[0].is_ok());
        assert!(matches!(
            result[1],
            Err(CodecError::MalformedChunk { offset: 4, .. })
        ));
    }

    #[test]
    fn stops_after_first_error() {
        let bytes = [6u8, 0xff, 0xff, 1, 2, 3];
        let mut decoder = decode(&bytes);
        assert!(decoder.next().unwrap().is_err());
        assert!(decoder.next().is_none());
    }

    #[test]
    fn children_report_absolute_offsets() {
        let mut bytes = encode_chunk(9, b"done").unwrap();
        bytes.extend(encode_record(4, &[(6, b"ab"), (11, &7i32.to_be_bytes())]).unwrap());

        let record = decode(&bytes).nth(1).unwrap().unwrap();
        assert_eq!(record.offset, 7);
        let children: Vec<_> = record.children().map(Result::unwrap).collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].offset, 10);
        assert_eq!(children[1].offset, 15);
        assert_eq!(children[1].read_i32().unwrap(), 7);
    }

    #[test]
    fn wrong_integer_width_is_malformed() {
        let bytes = encode_chunk(8, &[0, 1]).unwrap();
        let chunk = decode(&bytes).next().unwrap().unwrap();
        assert!(matches!(
            chunk.read_i32(),
            Err(CodecError::MalformedChunk { .. })
        ));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let bytes = encode_chunk(6, &[0xff, 0xfe]).unwrap();
        let chunk = decode(&bytes).next().unwrap().unwrap();
        assert_eq!(chunk.read_str(), Err(CodecError::InvalidUtf8 { tag: 6 }));
    }
}
