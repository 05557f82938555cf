//! Wire-format test vectors.
//!
//! Fixed byte layouts for chunks, records and frames, shared by the codec,
//! protocol and server tests and exportable as JSON for other clients.

use serde::{Deserialize, Serialize};
use todosync_protocol::{Frame, TaskRecord};

/// A named byte layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Expected encoding (hex).
    pub expected_hex: String,
}

impl TestVector {
    fn new(id: &str, description: &str, expected_hex: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_hex: expected_hex.into(),
        }
    }

    /// Decoded expected bytes.
    pub fn expected_bytes(&self) -> Vec<u8> {
        hex_decode(&self.expected_hex)
    }
}

/// Encodes bytes as lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes lowercase or uppercase hex.
///
/// # Panics
///
/// Panics on odd length or a non-hex digit.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "odd hex length");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("Invalid hex digit"))
        .collect()
}

fn zeros(count: usize) -> String {
    "00".repeat(count)
}

/// Single-chunk vectors as `(tag, payload)` inputs.
pub fn chunk_vectors() -> Vec<((u8, Vec<u8>), TestVector)> {
    vec![
        (
            (6, b"Buy milk".to_vec()),
            TestVector::new("chunk_title", "Title chunk", "060008427579206d696c6b"),
        ),
        (
            (10, Vec::new()),
            TestVector::new("chunk_empty", "Empty description chunk", "0a0000"),
        ),
        (
            (5, 258i32.to_be_bytes().to_vec()),
            TestVector::new("chunk_int", "Identifier chunk", "05000400000102"),
        ),
    ]
}

/// Record vectors.
pub fn record_vectors() -> Vec<(TaskRecord, TestVector)> {
    let record = TaskRecord::draft("a", "2024-01-02", 2, "open")
        .with_id(1)
        .with_revision(1);
    vec![(
        record,
        TestVector::new(
            "record_todo",
            "Complete CHUNK_TODO record, fields in wire order",
            concat!(
                "040030",
                "05000400000001",
                "06000161",
                "07000a323032342d30312d3032",
                "08000400000002",
                "0900046f70656e",
                "0a0000",
                "0b000400000001",
            ),
        ),
    )]
}

/// Deletion vectors: a CHUNK_DELETE carrying only the identifier.
pub fn deletion_vectors() -> Vec<(i64, TestVector)> {
    vec![(
        7,
        TestVector::new("record_delete", "Deletion of record 7", "03000705000400000007"),
    )]
}

/// Frame vectors.
pub fn frame_vectors() -> Vec<(Frame, TestVector)> {
    vec![
        (
            Frame::Register { client_id: 258 },
            TestVector::new(
                "frame_register",
                "REGISTER for client 258, padded to 40 bytes",
                format!("0100000102{}", zeros(35)),
            ),
        ),
        (
            Frame::RegisterAck,
            TestVector::new("frame_register_ack", "REGISTER_ACK", format!("02{}", zeros(7))),
        ),
        (
            Frame::ServerClientResp { len: 300 },
            TestVector::new(
                "frame_server_client_resp",
                "SERVER_CLIENT_RESP announcing 300 bytes",
                format!("040000012c{}", zeros(35)),
            ),
        ),
        (
            Frame::ServerClientResp { len: 4 },
            TestVector::new(
                "frame_server_client_resp_empty_record",
                "SERVER_CLIENT_RESP announcing the 4-byte datagram of frame_server_client_data",
                format!("0400000004{}", zeros(35)),
            ),
        ),
        (
            Frame::ServerClientData(vec![0x04, 0x00, 0x00]),
            TestVector::new(
                "frame_server_client_data",
                "SERVER_CLIENT_DATA carrying one empty record container",
                "0b040000",
            ),
        ),
        (
            Frame::ClientServerSync { len: 3 },
            TestVector::new(
                "frame_client_server_sync",
                "CLIENT_SERVER_SYNC announcing the 3-byte datagram of frame_client_server_data",
                format!("0600000003{}", zeros(35)),
            ),
        ),
        (
            Frame::Reset,
            TestVector::new("frame_reset", "RESET", format!("09{}", zeros(7))),
        ),
        (
            Frame::ClientServerData(vec![0xaa, 0xbb]),
            TestVector::new(
                "frame_client_server_data",
                "CLIENT_SERVER_DATA: type byte then payload",
                "0caabb",
            ),
        ),
    ]
}

/// Generate all test vectors as JSON.
pub fn all_vectors_json() -> String {
    let vectors = AllTestVectors {
        chunks: chunk_vectors().into_iter().map(|(_, v)| v).collect(),
        records: record_vectors().into_iter().map(|(_, v)| v).collect(),
        deletions: deletion_vectors().into_iter().map(|(_, v)| v).collect(),
        frames: frame_vectors().into_iter().map(|(_, v)| v).collect(),
    };

    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}

#[derive(Debug, Serialize, Deserialize)]
struct AllTestVectors {
    chunks: Vec<TestVector>,
    records: Vec<TestVector>,
    deletions: Vec<TestVector>,
    frames: Vec<TestVector>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use todosync_codec::encode_chunk;
    use todosync_protocol::{Changeset, RecordKind};

    #[test]
    fn hex_roundtrip() {
        let bytes = vec![0x00, 0x0f, 0xab, 0xff];
        assert_eq!(hex_encode(&bytes), "000fabff");
        assert_eq!(hex_decode("000FABFF"), bytes);
    }

    #[test]
    fn chunk_vectors_match_encoder() {
        for ((tag, payload), vector) in chunk_vectors() {
            assert_eq!(
                hex_encode(&encode_chunk(tag, &payload).unwrap()),
                vector.expected_hex,
                "{}",
                vector.id
            );
        }
    }

    #[test]
    fn record_vectors_match_encoder() {
        for (record, vector) in record_vectors() {
            assert_eq!(
                record.encode(RecordKind::Todo).unwrap(),
                vector.expected_bytes(),
                "{}",
                vector.id
            );
        }
    }

    #[test]
    fn deletion_vectors_match_changeset() {
        for (id, vector) in deletion_vectors() {
            let changeset = Changeset {
                deleted: vec![id],
                ..Changeset::default()
            };
            assert_eq!(changeset.encode().unwrap(), vector.expected_bytes());
        }
    }

    #[test]
    fn frame_vectors_match_encoder() {
        for (frame, vector) in frame_vectors() {
            let bytes = vector.expected_bytes();
            assert_eq!(frame.encode(), bytes, "{}", vector.id);
            assert_eq!(Frame::decode(&bytes), Some(frame), "{}", vector.id);
        }
    }

    #[test]
    fn announcements_cover_whole_data_datagram() {
        let frames = frame_vectors();
        let bytes_of = |id: &str| {
            frames
                .iter()
                .find(|(_, v)| v.id == id)
                .map(|(_, v)| v.expected_bytes())
                .unwrap()
        };
        let announced = |id: &str| u32::from_be_bytes(bytes_of(id)[1..5].try_into().unwrap());

        for (announcement, data) in [
            ("frame_server_client_resp_empty_record", "frame_server_client_data"),
            ("frame_client_server_sync", "frame_client_server_data"),
        ] {
            let datagram = bytes_of(data);
            assert_eq!(announced(announcement) as usize, datagram.len(), "{data}");
            assert_eq!(
                todosync_protocol::announced_len(datagram.len() - 1),
                Some(announced(announcement))
            );
        }
    }

    #[test]
    fn vectors_export_as_json() {
        let json = all_vectors_json();
        assert!(json.contains("frame_register"));
        assert!(json.contains("record_todo"));
    }
}
