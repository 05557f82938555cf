//! Datagram frames exchanged between client and server.
//!
//! The first byte of every frame is its type. Control frames are padded
//! with zeros to a fixed size: 40 bytes when they carry a 32-bit field,
//! 8 bytes otherwise. Data frames are the type byte followed by the
//! payload. All integers are big-endian.
//!
//! The length announced by SERVER_CLIENT_RESP and CLIENT_SERVER_SYNC is
//! the size of the whole data datagram that follows, type byte included.

/// Size of a frame carrying a 32-bit field.
pub const LONG_FRAME_LEN: usize = 40;

/// Size of a frame carrying no field.
pub const SHORT_FRAME_LEN: usize = 8;

/// Length to announce for a data datagram carrying `payload_len` bytes.
///
/// Returns `None` when the datagram size does not fit the 32-bit field.
pub fn announced_len(payload_len: usize) -> Option<u32> {
    payload_len
        .checked_add(1)
        .and_then(|len| u32::try_from(len).ok())
}

/// Payload size of a data datagram announced as `len` bytes.
///
/// Returns `None` for zero, which cannot hold the type byte.
pub fn announced_payload_len(len: u32) -> Option<usize> {
    (len as usize).checked_sub(1)
}

/// Frame type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Client registration.
    Register,
    /// Registration accepted.
    RegisterAck,
    /// Client asks for the server's records.
    ServerClientSync,
    /// Server announces the snapshot length.
    ServerClientResp,
    /// Client is ready for the snapshot.
    ServerClientRespAck,
    /// Client announces the changeset length.
    ClientServerSync,
    /// Server is ready for the changeset.
    ClientServerResp,
    /// Server applied the changeset.
    ClientServerRespAck,
    /// Client ends the session.
    Reset,
    /// Session ended.
    ResetAck,
    /// Snapshot payload.
    ServerClientData,
    /// Changeset payload.
    ClientServerData,
}

impl FrameType {
    /// Converts to the wire code.
    pub fn to_code(&self) -> u8 {
        match self {
            FrameType::Register => 1,
            FrameType::RegisterAck => 2,
            FrameType::ServerClientSync => 3,
            FrameType::ServerClientResp => 4,
            FrameType::ServerClientRespAck => 5,
            FrameType::ClientServerSync => 6,
            FrameType::ClientServerResp => 7,
            FrameType::ClientServerRespAck => 8,
            FrameType::Reset => 9,
            FrameType::ResetAck => 10,
            FrameType::ServerClientData => 11,
            FrameType::ClientServerData => 12,
        }
    }

    /// Converts from the wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FrameType::Register),
            2 => Some(FrameType::RegisterAck),
            3 => Some(FrameType::ServerClientSync),
            4 => Some(FrameType::ServerClientResp),
            5 => Some(FrameType::ServerClientRespAck),
            6 => Some(FrameType::ClientServerSync),
            7 => Some(FrameType::ClientServerResp),
            8 => Some(FrameType::ClientServerRespAck),
            9 => Some(FrameType::Reset),
            10 => Some(FrameType::ResetAck),
            11 => Some(FrameType::ServerClientData),
            12 => Some(FrameType::ClientServerData),
            _ => None,
        }
    }

    /// Fixed size of this frame type, or `None` for data frames.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            FrameType::Register | FrameType::ServerClientResp | FrameType::ClientServerSync => {
                Some(LONG_FRAME_LEN)
            }
            FrameType::ServerClientData | FrameType::ClientServerData => None,
            _ => Some(SHORT_FRAME_LEN),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Client registration.
    Register {
        /// Numeric client identifier.
        client_id: i32,
    },
    /// Registration accepted.
    RegisterAck,
    /// Client asks for the server's records.
    ServerClientSync,
    /// Server announces the snapshot length.
    ServerClientResp {
        /// Size of the snapshot datagram, type byte included.
        len: u32,
    },
    /// Client is ready for the snapshot.
    ServerClientRespAck,
    /// Client announces the changeset length.
    ClientServerSync {
        /// Size of the changeset datagram, type byte included.
        len: u32,
    },
    /// Server is ready for the changeset.
    ClientServerResp,
    /// Server applied the changeset.
    ClientServerRespAck,
    /// Client ends the session.
    Reset,
    /// Session ended.
    ResetAck,
    /// Snapshot payload.
    ServerClientData(Vec<u8>),
    /// Changeset payload.
    ClientServerData(Vec<u8>),
}

impl Frame {
    /// Returns the frame type.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Register { .. } => FrameType::Register,
            Frame::RegisterAck => FrameType::RegisterAck,
            Frame::ServerClientSync => FrameType::ServerClientSync,
            Frame::ServerClientResp { .. } => FrameType::ServerClientResp,
            Frame::ServerClientRespAck => FrameType::ServerClientRespAck,
            Frame::ClientServerSync { .. } => FrameType::ClientServerSync,
            Frame::ClientServerResp => FrameType::ClientServerResp,
            Frame::ClientServerRespAck => FrameType::ClientServerRespAck,
            Frame::Reset => FrameType::Reset,
            Frame::ResetAck => FrameType::ResetAck,
            Frame::ServerClientData(_) => FrameType::ServerClientData,
            Frame::ClientServerData(_) => FrameType::ClientServerData,
        }
    }

    /// Encodes the frame as a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let kind = self.frame_type();
        let mut bytes = match self {
            Frame::ServerClientData(payload) | Frame::ClientServerData(payload) => {
                let mut bytes = Vec::with_capacity(1 + payload.len());
                bytes.push(kind.to_code());
                bytes.extend_from_slice(payload);
                return bytes;
            }
            _ => vec![0u8; kind.fixed_len().unwrap_or(SHORT_FRAME_LEN)],
        };
        bytes[0] = kind.to_code();
        match self {
            Frame::Register { client_id } => bytes[1..5].copy_from_slice(&client_id.to_be_bytes()),
            Frame::ServerClientResp { len } | Frame::ClientServerSync { len } => {
                bytes[1..5].copy_from_slice(&len.to_be_bytes());
            }
            _ => {}
        }
        bytes
    }

    /// Decodes a datagram.
    ///
    /// Returns `None` for an unknown type byte or a control frame shorter
    /// than its fixed size.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        let (&code, rest) = datagram.split_first()?;
        let kind = FrameType::from_code(code)?;
        if let Some(len) = kind.fixed_len() {
            if datagram.len() < len {
                return None;
            }
        }
        let field = || -> [u8; 4] { [rest[0], rest[1], rest[2], rest[3]] };
        let frame = match kind {
            FrameType::Register => Frame::Register {
                client_id: i32::from_be_bytes(field()),
            },
            FrameType::RegisterAck => Frame::RegisterAck,
            FrameType::ServerClientSync => Frame::ServerClientSync,
            FrameType::ServerClientResp => Frame::ServerClientResp {
                len: u32::from_be_bytes(field()),
            },
            FrameType::ServerClientRespAck => Frame::ServerClientRespAck,
            FrameType::ClientServerSync => Frame::ClientServerSync {
                len: u32::from_be_bytes(field()),
            },
            FrameType::ClientServerResp => Frame::ClientServerResp,
            FrameType::ClientServerRespAck => Frame::ClientServerRespAck,
            FrameType::Reset => Frame::Reset,
            FrameType::ResetAck => Frame::ResetAck,
            FrameType::ServerClientData => Frame::ServerClientData(rest.to_vec()),
            FrameType::ClientServerData => Frame::ClientServerData(rest.to_vec()),
        };
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for code in 1..=12 {
            assert_eq!(FrameType::from_code(code).unwrap().to_code(), code);
        }
        assert_eq!(FrameType::from_code(0), None);
        assert_eq!(FrameType::from_code(13), None);
    }

    #[test]
    fn register_layout() {
        let bytes = Frame::Register { client_id: 258 }.encode();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[..5], &[1, 0, 0, 1, 2]);
        assert!(bytes[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn short_frames_are_eight_bytes() {
        for frame in [
            Frame::RegisterAck,
            Frame::ServerClientSync,
            Frame::ServerClientRespAck,
            Frame::ClientServerResp,
            Frame::ClientServerRespAck,
            Frame::Reset,
            Frame::ResetAck,
        ] {
            let bytes = frame.encode();
            assert_eq!(bytes.len(), SHORT_FRAME_LEN);
            assert_eq!(Frame::decode(&bytes), Some(frame));
        }
    }

    #[test]
    fn length_frames() {
        let frame = Frame::ClientServerSync { len: 70_000 };
        let bytes = frame.encode();
        assert_eq!(bytes.len(), LONG_FRAME_LEN);
        assert_eq!(bytes[0], 6);
        assert_eq!(Frame::decode(&bytes), Some(frame));

        let frame = Frame::ServerClientResp { len: 12 };
        assert_eq!(Frame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn data_frames_prefix_tag() {
        let frame = Frame::ClientServerData(vec![1, 2, 3]);
        assert_eq!(frame.encode(), vec![12, 1, 2, 3]);
        assert_eq!(Frame::decode(&[11]), Some(Frame::ServerClientData(vec![])));
    }

    #[test]
    fn announced_length_counts_type_byte() {
        let payload = vec![4, 0, 0];
        let len = announced_len(payload.len()).unwrap();
        assert_eq!(len, 4);
        assert_eq!(Frame::ServerClientData(payload.clone()).encode().len(), 4);
        assert_eq!(announced_payload_len(len), Some(3));

        let announcement = Frame::ServerClientResp { len }.encode();
        assert_eq!(&announcement[..5], &[4, 0, 0, 0, 4]);
        assert_eq!(announced_len(0), Some(1));
        assert_eq!(announced_payload_len(1), Some(0));
        assert_eq!(announced_payload_len(0), None);
        assert_eq!(announced_len(u32::MAX as usize), None);
    }

    #[test]
    fn rejects_short_and_unknown() {
        assert_eq!(Frame::decode(&[]), None);
        assert_eq!(Frame::decode(&[2, 0, 0]), None);
        assert_eq!(Frame::decode(&[1; 8]), None);
        assert_eq!(Frame::decode(&[99; 40]), None);
    }
}
