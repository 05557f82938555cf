//! # todosync Codec
//!
//! TLV (tag-length-value) chunk encoding/decoding for the todosync wire
//! format.
//!
//! Every chunk is laid out as:
//!
//! ```text
//! +-----+-----------------+-------------------+
//! | tag | length (u16 BE) | payload (length)  |
//! +-----+-----------------+-------------------+
//! ```
//!
//! Records are chunks whose payload is itself a sequence of chunks.
//! Integers are 32-bit big-endian, text is UTF-8 with no terminator.
//!
//! ## Usage
//!
//! ```
//! use todosync_codec::{decode, encode_chunk};
//!
//! let bytes = encode_chunk(6, b"Buy milk").unwrap();
//! let chunk = decode(&bytes).next().unwrap().unwrap();
//! assert_eq!(chunk.tag, 6);
//! assert_eq!(chunk.read_str().unwrap(), "Buy milk");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;

pub use decoder::{decode, Chunk, ChunkDecoder};
pub use encoder::{encode_chunk, encode_record, ChunkEncoder, RecordMark};
pub use error::{CodecError, CodecResult};

/// Size of a chunk header: one tag byte plus a 16-bit length.
pub const HEADER_LEN: usize = 3;

/// Largest payload a single chunk can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunk_strategy() -> impl Strategy<Value = (u8, Vec<u8>)> {
        (any::<u8>(), prop::collection::vec(any::<u8>(), 0..256))
    }

    proptest! {
        #[test]
        fn reencoding_decoded_chunks_is_identity(
            chunks in prop::collection::vec(chunk_strategy(), 0..16)
        ) {
            let mut encoder = ChunkEncoder::new();
            for (tag, payload) in &chunks {
                encoder.put_chunk(*tag, payload).unwrap();
            }
            let bytes = encoder.into_bytes();

            let mut reencoded = ChunkEncoder::new();
            for chunk in decode(&bytes) {
                let chunk = chunk.unwrap();
                reencoded.put_chunk(chunk.tag, chunk.payload).unwrap();
            }
            prop_assert_eq!(reencoded.into_bytes(), bytes);
        }

        #[test]
        fn decoded_chunks_match_input(
            chunks in prop::collection::vec(chunk_strategy(), 0..16)
        ) {
            let mut encoder = ChunkEncoder::new();
            for (tag, payload) in &chunks {
                encoder.put_chunk(*tag, payload).unwrap();
            }
            let bytes = encoder.into_bytes();

            let decoded: Vec<(u8, Vec<u8>)> = decode(&bytes)
                .map(|c| c.map(|c| (c.tag, c.payload.to_vec())))
                .collect::<CodecResult<_>>()
                .unwrap();
            prop_assert_eq!(decoded, chunks);
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            for chunk in decode(&bytes).flatten() {
                prop_assert!(chunk.encoded_len() <= bytes.len());
            }
        }
    }
}
