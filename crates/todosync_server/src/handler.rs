//! Per-peer request handling.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::ServerStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use todosync_protocol::{announced_len, announced_payload_len, encode_snapshot, Changeset, Frame};

/// Largest payload a data frame may carry on UDP.
const MAX_PAYLOAD: usize = 65_507 - 1;

/// Context shared by every request.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Record sets of all clients.
    pub store: Arc<ServerStore>,
    sessions: Mutex<HashMap<SocketAddr, PeerSession>>,
}

/// State of one peer between REGISTER and RESET.
#[derive(Debug, Clone, Default)]
struct PeerSession {
    client_id: i32,
    /// Snapshot announced by the last SERVER_CLIENT_RESP.
    snapshot: Option<Vec<u8>>,
    /// Payload size implied by the length CLIENT_SERVER_SYNC announced.
    expected_push: Option<usize>,
    /// The announced changeset was already applied.
    push_applied: bool,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        Self {
            config,
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of peers with an open session.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Handler for protocol frames.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles one datagram from `peer` and returns the reply, if any.
    ///
    /// Undecodable datagrams and server-to-client frame types are dropped.
    pub fn handle_datagram(&self, peer: SocketAddr, datagram: &[u8]) -> ServerResult<Option<Frame>> {
        let Some(frame) = Frame::decode(datagram) else {
            tracing::trace!(%peer, len = datagram.len(), "dropped undecodable datagram");
            return Ok(None);
        };
        tracing::trace!(%peer, kind = ?frame.frame_type(), "received frame");
        self.handle_frame(peer, frame)
    }

    /// Handles one decoded frame from `peer`.
    pub fn handle_frame(&self, peer: SocketAddr, frame: Frame) -> ServerResult<Option<Frame>> {
        match frame {
            Frame::Register { client_id } => Ok(self.handle_register(peer, client_id)),
            Frame::ServerClientSync => self.handle_pull_request(peer).map(Some),
            Frame::ServerClientRespAck => self.handle_pull_ack(peer).map(Some),
            Frame::ClientServerSync { len } => self.handle_push_request(peer, len).map(Some),
            Frame::ClientServerData(payload) => self.handle_push_data(peer, &payload),
            Frame::Reset => {
                if let Some(session) = self.context.sessions.lock().remove(&peer) {
                    tracing::debug!(%peer, client_id = session.client_id, "session reset");
                }
                Ok(Some(Frame::ResetAck))
            }
            other => Err(ServerError::InvalidRequest(format!(
                "{:?} is not a client frame",
                other.frame_type()
            ))),
        }
    }

    fn handle_register(&self, peer: SocketAddr, client_id: i32) -> Option<Frame> {
        if !self.context.config.accept_registrations {
            tracing::debug!(%peer, client_id, "registration declined");
            return None;
        }
        self.context.store.register(client_id);
        self.context.sessions.lock().insert(
            peer,
            PeerSession {
                client_id,
                ..PeerSession::default()
            },
        );
        tracing::info!(%peer, client_id, "client registered");
        Some(Frame::RegisterAck)
    }

    fn handle_pull_request(&self, peer: SocketAddr) -> ServerResult<Frame> {
        let mut sessions = self.context.sessions.lock();
        let session = sessions
            .get_mut(&peer)
            .ok_or(ServerError::NotRegistered(peer))?;
        let snapshot = match &session.snapshot {
            Some(snapshot) => snapshot.len(),
            None => {
                let records = self.context.store.records(session.client_id);
                let bytes = encode_snapshot(&records)?;
                if bytes.len() > MAX_PAYLOAD {
                    return Err(ServerError::PayloadTooLarge(bytes.len()));
                }
                tracing::debug!(%peer, records = records.len(), len = bytes.len(), "snapshot prepared");
                let len = bytes.len();
                session.snapshot = Some(bytes);
                len
            }
        };
        let len = announced_len(snapshot).ok_or(ServerError::PayloadTooLarge(snapshot))?;
        Ok(Frame::ServerClientResp { len })
    }

    fn handle_pull_ack(&self, peer: SocketAddr) -> ServerResult<Frame> {
        let sessions = self.context.sessions.lock();
        let session = sessions.get(&peer).ok_or(ServerError::NotRegistered(peer))?;
        let snapshot = session.snapshot.clone().ok_or_else(|| {
            ServerError::InvalidRequest("snapshot acknowledged before it was announced".into())
        })?;
        Ok(Frame::ServerClientData(snapshot))
    }

    fn handle_push_request(&self, peer: SocketAddr, announced: u32) -> ServerResult<Frame> {
        let len = announced_payload_len(announced).ok_or_else(|| {
            ServerError::InvalidRequest("announced an empty changeset datagram".into())
        })?;
        if len > MAX_PAYLOAD {
            return Err(ServerError::PayloadTooLarge(len));
        }
        let mut sessions = self.context.sessions.lock();
        let session = sessions
            .get_mut(&peer)
            .ok_or(ServerError::NotRegistered(peer))?;
        if session.expected_push != Some(len) || session.push_applied {
            session.expected_push = Some(len);
            session.push_applied = false;
        }
        Ok(Frame::ClientServerResp)
    }

    fn handle_push_data(&self, peer: SocketAddr, payload: &[u8]) -> ServerResult<Option<Frame>> {
        let mut sessions = self.context.sessions.lock();
        let session = sessions
            .get_mut(&peer)
            .ok_or(ServerError::NotRegistered(peer))?;
        if session.expected_push != Some(payload.len()) {
            return Err(ServerError::InvalidRequest(format!(
                "changeset datagram of {} bytes does not match the announced {:?}",
                payload.len() + 1,
                session.expected_push.map(|len| len + 1)
            )));
        }
        if session.push_applied {
            tracing::debug!(%peer, "re-acknowledging duplicate changeset");
            return Ok(Some(Frame::ClientServerRespAck));
        }

        let changeset = Changeset::decode(payload)?;
        let stats = self.context.store.apply(session.client_id, &changeset);
        session.push_applied = true;
        tracing::info!(
            %peer,
            client_id = session.client_id,
            inserted = stats.inserted,
            updated = stats.updated,
            deleted = stats.deleted,
            skipped = stats.skipped,
            "changeset applied"
        );
        Ok(Some(Frame::ClientServerRespAck))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todosync_protocol::{decode_snapshot, TaskRecord};

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn task(id: i64, title: &str, revision: i32) -> TaskRecord {
        TaskRecord::draft(title, "2024-05-01", 1, "open")
            .with_id(id)
            .with_revision(revision)
    }

    fn handler(config: ServerConfig) -> (RequestHandler, Arc<HandlerContext>) {
        let context = Arc::new(HandlerContext::new(config, Arc::new(ServerStore::new())));
        (RequestHandler::new(Arc::clone(&context)), context)
    }

    #[test]
    fn declining_server_stays_silent() {
        let (handler, context) = handler(ServerConfig::loopback().declining());
        let reply = handler
            .handle_frame(peer(), Frame::Register { client_id: 3 })
            .unwrap();
        assert_eq!(reply, None);
        assert_eq!(context.session_count(), 0);
        assert_eq!(
            handler.handle_frame(peer(), Frame::Reset).unwrap(),
            Some(Frame::ResetAck)
        );
    }

    #[test]
    fn pull_before_register_is_rejected() {
        let (handler, _) = handler(ServerConfig::loopback());
        let err = handler
            .handle_frame(peer(), Frame::ServerClientSync)
            .unwrap_err();
        assert!(matches!(err, ServerError::NotRegistered(_)));
    }

    #[test]
    fn pull_serves_a_stable_snapshot() {
        let (handler, context) = handler(ServerConfig::loopback());
        context.store.seed(3, [task(1, "a", 2), task(2, "b", 1)]);

        handler
            .handle_frame(peer(), Frame::Register { client_id: 3 })
            .unwrap();
        let announced = handler
            .handle_frame(peer(), Frame::ServerClientSync)
            .unwrap();
        context.store.seed(3, []);
        let again = handler
            .handle_frame(peer(), Frame::ServerClientSync)
            .unwrap();
        assert_eq!(announced, again);

        let Some(Frame::ServerClientResp { len }) = announced else {
            panic!("expected SERVER_CLIENT_RESP");
        };
        let Some(Frame::ServerClientData(payload)) = handler
            .handle_frame(peer(), Frame::ServerClientRespAck)
            .unwrap()
        else {
            panic!("expected SERVER_CLIENT_DATA");
        };
        assert_eq!(Frame::ServerClientData(payload.clone()).encode().len(), len as usize);
        let records: Vec<TaskRecord> = decode_snapshot(&payload)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records, vec![task(1, "a", 2), task(2, "b", 1)]);
    }

    #[test]
    fn duplicate_changeset_applied_once() {
        let (handler, context) = handler(ServerConfig::loopback());
        handler
            .handle_frame(peer(), Frame::Register { client_id: 9 })
            .unwrap();

        let payload = Changeset {
            new: vec![task(1, "a", -1)],
            ..Changeset::default()
        }
        .encode()
        .unwrap();
        let len = payload.len() as u32 + 1;

        assert_eq!(
            handler
                .handle_frame(peer(), Frame::ClientServerSync { len })
                .unwrap(),
            Some(Frame::ClientServerResp)
        );
        for _ in 0..2 {
            let reply = handler
                .handle_frame(peer(), Frame::ClientServerData(payload.clone()))
                .unwrap();
            assert_eq!(reply, Some(Frame::ClientServerRespAck));
        }
        context.store.seed(9, []);
        handler
            .handle_frame(peer(), Frame::ClientServerData(payload))
            .unwrap();
        assert!(context.store.is_empty(9));
    }

    #[test]
    fn mismatched_changeset_length_is_rejected() {
        let (handler, context) = handler(ServerConfig::loopback());
        handler
            .handle_frame(peer(), Frame::Register { client_id: 9 })
            .unwrap();
        handler
            .handle_frame(peer(), Frame::ClientServerSync { len: 4 })
            .unwrap();
        let err = handler
            .handle_frame(peer(), Frame::ClientServerData(vec![0; 4]))
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(context.store.is_empty(9));
        assert!(handler
            .handle_frame(peer(), Frame::ClientServerSync { len: 0 })
            .unwrap_err()
            .is_client_error());
    }

    #[test]
    fn announced_lengths_include_type_byte() {
        let (handler, context) = handler(ServerConfig::loopback());
        handler
            .handle_frame(peer(), Frame::Register { client_id: 9 })
            .unwrap();

        assert_eq!(
            handler.handle_frame(peer(), Frame::ServerClientSync).unwrap(),
            Some(Frame::ServerClientResp { len: 1 })
        );
        let mut announcement = vec![0u8; 40];
        announcement[..5].copy_from_slice(&[6, 0, 0, 0, 1]);
        let reply = handler.handle_datagram(peer(), &announcement).unwrap();
        assert_eq!(reply, Some(Frame::ClientServerResp));
        let reply = handler.handle_datagram(peer(), &[12]).unwrap();
        assert_eq!(reply, Some(Frame::ClientServerRespAck));
        assert!(context.store.is_empty(9));
    }

    #[test]
    fn server_frames_from_clients_are_invalid() {
        let (handler, _) = handler(ServerConfig::loopback());
        assert!(handler.handle_frame(peer(), Frame::RegisterAck).is_err());
        assert_eq!(handler.handle_datagram(peer(), &[0xff]).unwrap(), None);
    }
}
