//! Datagram transport session.
//!
//! Every phase sends one frame and waits for one reply type. On timeout the
//! same frame is sent again; replies of any other type are discarded while
//! the wait continues.

use crate::config::TransportConfig;
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};
use todosync_protocol::{announced_len, announced_payload_len, Frame, FrameType};

/// Largest datagram UDP can carry over IPv4.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// A connected, unreliable datagram socket.
pub trait DatagramSocket: Send {
    /// Sends one datagram to the peer.
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Waits up to `timeout` for one datagram.
    ///
    /// Returns `Ok(None)` when the wait timed out.
    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;
}

impl DatagramSocket for UdpSocket {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        UdpSocket::send(self, datagram).map(|_| ())
    }

    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        // A zero read timeout is rejected by the OS.
        self.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match self.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Opens a UDP socket connected to `server`.
pub fn connect_udp(server: SocketAddr) -> SyncResult<UdpSocket> {
    let local: SocketAddr = if server.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(local)?;
    socket.connect(server)?;
    Ok(socket)
}

/// One client-server exchange sequence.
pub struct TransportSession<S: DatagramSocket> {
    socket: Option<S>,
    config: TransportConfig,
    buf: Vec<u8>,
    retransmissions: u64,
}

impl TransportSession<UdpSocket> {
    /// Opens a session over UDP.
    pub fn connect(server: SocketAddr, config: TransportConfig) -> SyncResult<Self> {
        Ok(Self::new(connect_udp(server)?, config))
    }
}

impl<S: DatagramSocket> TransportSession<S> {
    /// Creates a session over an already connected socket.
    pub fn new(socket: S, config: TransportConfig) -> Self {
        Self {
            socket: Some(socket),
            config,
            buf: vec![0u8; MAX_DATAGRAM_LEN + 1],
            retransmissions: 0,
        }
    }

    /// Returns true until the session is closed or released.
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Number of frames sent again after a timeout.
    pub fn retransmissions(&self) -> u64 {
        self.retransmissions
    }

    /// Registers the client.
    ///
    /// Returns `false` when no REGISTER_ACK arrived within all attempts,
    /// which means the server declined the client.
    pub fn register(&mut self, client_id: i32) -> SyncResult<bool> {
        let request = Frame::Register { client_id }.encode();
        let timeout = self.config.register_timeout;
        let attempts = self.config.register_attempts;
        let reply = self.exchange(&request, timeout, Some(attempts), |frame| {
            matches!(frame, Frame::RegisterAck)
        })?;
        Ok(reply.is_some())
    }

    /// Fetches the server's record set.
    pub fn pull_from_server(&mut self) -> SyncResult<Vec<u8>> {
        let request = Frame::ServerClientSync.encode();
        let timeout = self.config.request_timeout;
        let len = match self.exchange_until(&request, timeout, |frame| {
            matches!(frame, Frame::ServerClientResp { .. })
        })? {
            Frame::ServerClientResp { len } => len,
            other => return Err(unexpected(&other)),
        };
        if len as usize > MAX_DATAGRAM_LEN {
            return Err(SyncError::Protocol(format!(
                "announced snapshot datagram of {len} bytes exceeds the datagram limit"
            )));
        }
        let payload_len = announced_payload_len(len).ok_or_else(|| {
            SyncError::Protocol("announced an empty snapshot datagram".into())
        })?;

        let ack = Frame::ServerClientRespAck.encode();
        let timeout = self.config.data_timeout;
        match self.exchange_until(&ack, timeout, |frame| {
            matches!(frame, Frame::ServerClientData(payload) if payload.len() == payload_len)
        })? {
            Frame::ServerClientData(payload) => Ok(payload),
            other => Err(unexpected(&other)),
        }
    }

    /// Sends the outbound changeset.
    pub fn push_to_server(&mut self, payload: &[u8]) -> SyncResult<()> {
        let len = announced_len(payload.len())
            .filter(|len| *len as usize <= MAX_DATAGRAM_LEN)
            .ok_or_else(|| {
                SyncError::Protocol(format!(
                    "changeset of {} bytes does not fit a datagram",
                    payload.len()
                ))
            })?;

        let request = Frame::ClientServerSync { len }.encode();
        let timeout = self.config.request_timeout;
        self.exchange_until(&request, timeout, |frame| {
            matches!(frame, Frame::ClientServerResp)
        })?;

        let data = Frame::ClientServerData(payload.to_vec()).encode();
        let timeout = self.config.data_timeout;
        self.exchange_until(&data, timeout, |frame| {
            matches!(frame, Frame::ClientServerRespAck)
        })?;
        Ok(())
    }

    /// Ends the session and releases the socket.
    pub fn close(&mut self) -> SyncResult<()> {
        let request = Frame::Reset.encode();
        let timeout = self.config.reset_timeout;
        self.exchange_until(&request, timeout, |frame| matches!(frame, Frame::ResetAck))?;
        self.socket = None;
        Ok(())
    }

    /// Releases the socket after an aborted run.
    ///
    /// Sends RESET up to `release_attempts` times, stops at the first
    /// RESET_ACK and ignores every failure.
    pub fn release(&mut self) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };
        let request = Frame::Reset.encode();
        for attempt in 0..self.config.release_attempts {
            if socket.send(&request).is_err() {
                break;
            }
            tracing::trace!(attempt, "sent RESET on release");
            let deadline = Instant::now() + self.config.reset_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match socket.recv_timeout(&mut self.buf, remaining) {
                    Ok(Some(n)) if Frame::decode(&self.buf[..n]) == Some(Frame::ResetAck) => {
                        return;
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }

    /// Resends `request` until an accepted reply arrives.
    fn exchange_until(
        &mut self,
        request: &[u8],
        timeout: Duration,
        accept: impl Fn(&Frame) -> bool,
    ) -> SyncResult<Frame> {
        match self.exchange(request, timeout, None, accept)? {
            Some(frame) => Ok(frame),
            None => Err(SyncError::Protocol("unbounded exchange gave up".into())),
        }
    }

    /// Sends `request` and waits for an accepted reply, resending on each
    /// timeout. Gives up after `attempts` sends when a limit is given.
    fn exchange(
        &mut self,
        request: &[u8],
        timeout: Duration,
        attempts: Option<u32>,
        accept: impl Fn(&Frame) -> bool,
    ) -> SyncResult<Option<Frame>> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| SyncError::transport("session is closed"))?;
        let kind = request.first().copied().and_then(FrameType::from_code);

        let mut sent = 0u32;
        loop {
            if attempts.is_some_and(|limit| sent >= limit) {
                return Ok(None);
            }
            if sent > 0 {
                self.retransmissions += 1;
                tracing::debug!(?kind, attempt = sent + 1, "retransmitting");
            }
            socket.send(request)?;
            sent += 1;
            tracing::trace!(?kind, len = request.len(), "sent datagram");

            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let Some(n) = socket.recv_timeout(&mut self.buf, remaining)? else {
                    break;
                };
                match Frame::decode(&self.buf[..n]) {
                    Some(frame) if accept(&frame) => {
                        tracing::trace!(kind = ?frame.frame_type(), len = n, "received datagram");
                        return Ok(Some(frame));
                    }
                    other => {
                        tracing::trace!(
                            kind = ?other.map(|f| f.frame_type()),
                            len = n,
                            "discarded datagram"
                        );
                    }
                }
            }
        }
    }
}

fn unexpected(frame: &Frame) -> SyncError {
    SyncError::Protocol(format!("unexpected {:?} frame", frame.frame_type()))
}

/// A scripted in-memory socket for testing.
///
/// Every `recv_timeout` call consumes one scripted reply; an empty script
/// behaves like a silent peer. Clones share the same script and record of
/// sent datagrams.
#[derive(Debug, Clone, Default)]
pub struct MockSocket {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    replies: VecDeque<Option<Vec<u8>>>,
    sent: Vec<Vec<u8>>,
    fail_sends: bool,
}

impl MockSocket {
    /// Creates a silent mock socket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply frame.
    pub fn reply(&self, frame: Frame) -> &Self {
        self.reply_raw(frame.encode())
    }

    /// Queues a raw reply datagram.
    pub fn reply_raw(&self, datagram: Vec<u8>) -> &Self {
        self.state.lock().replies.push_back(Some(datagram));
        self
    }

    /// Queues one timed-out wait.
    pub fn silence(&self) -> &Self {
        self.state.lock().replies.push_back(None);
        self
    }

    /// Makes every send fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Datagrams sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Frames sent so far, undecodable datagrams skipped.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|d| Frame::decode(d))
            .collect()
    }

    /// Number of scripted replies not consumed yet.
    pub fn pending_replies(&self) -> usize {
        self.state.lock().replies.len()
    }
}

impl DatagramSocket for MockSocket {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(io::Error::new(
                io::ErrorKind::NetworkUnreachable,
                "network is unreachable",
            ));
        }
        state.sent.push(datagram.to_vec());
        Ok(())
    }

    fn recv_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<Option<usize>> {
        match self.state.lock().replies.pop_front().flatten() {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(Some(n))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(socket: &MockSocket) -> TransportSession<MockSocket> {
        TransportSession::new(
            socket.clone(),
            TransportConfig::uniform(Duration::from_millis(50)),
        )
    }

    #[test]
    fn register_acknowledged() {
        let socket = MockSocket::new();
        socket.reply(Frame::RegisterAck);
        let mut session = session(&socket);

        assert!(session.register(7).unwrap());
        assert_eq!(socket.sent_frames(), vec![Frame::Register { client_id: 7 }]);
        assert_eq!(socket.sent()[0].len(), 40);
    }

    #[test]
    fn register_gives_up_after_all_attempts() {
        let socket = MockSocket::new();
        let mut session = session(&socket);

        assert!(!session.register(7).unwrap());
        assert_eq!(socket.sent().len(), 5);
        assert_eq!(session.retransmissions(), 4);
    }

    #[test]
    fn register_retries_after_silence() {
        let socket = MockSocket::new();
        socket.silence().silence().reply(Frame::RegisterAck);
        let mut session = session(&socket);

        assert!(session.register(1).unwrap());
        assert_eq!(socket.sent().len(), 3);
        assert!(socket.sent().iter().all(|d| d == &socket.sent()[0]));
    }

    #[test]
    fn mismatched_replies_are_discarded() {
        let socket = MockSocket::new();
        socket
            .reply(Frame::ResetAck)
            .reply_raw(vec![99, 0, 0])
            .reply(Frame::RegisterAck);
        let mut session = session(&socket);

        assert!(session.register(1).unwrap());
        assert_eq!(socket.sent().len(), 1);
    }

    #[test]
    fn pull_returns_payload() {
        let socket = MockSocket::new();
        socket
            .silence()
            .reply(Frame::ServerClientResp { len: 4 })
            .silence()
            .reply(Frame::ServerClientData(vec![4, 0, 0]));
        let mut session = session(&socket);

        assert_eq!(session.pull_from_server().unwrap(), vec![4, 0, 0]);
        assert_eq!(
            socket.sent_frames(),
            vec![
                Frame::ServerClientSync,
                Frame::ServerClientSync,
                Frame::ServerClientRespAck,
                Frame::ServerClientRespAck,
            ]
        );
    }

    #[test]
    fn pull_ignores_data_of_wrong_length() {
        let socket = MockSocket::new();
        socket
            .reply(Frame::ServerClientResp { len: 3 })
            .reply(Frame::ServerClientData(vec![1]))
            .reply(Frame::ServerClientData(vec![1, 2, 3]))
            .reply(Frame::ServerClientData(vec![1, 2]));
        let mut session = session(&socket);

        assert_eq!(session.pull_from_server().unwrap(), vec![1, 2]);
    }

    #[test]
    fn push_sends_length_then_payload() {
        let socket = MockSocket::new();
        socket
            .reply(Frame::ClientServerResp)
            .silence()
            .reply(Frame::ClientServerRespAck);
        let mut session = session(&socket);

        session.push_to_server(&[1, 2, 3, 4]).unwrap();
        assert_eq!(
            socket.sent_frames(),
            vec![
                Frame::ClientServerSync { len: 5 },
                Frame::ClientServerData(vec![1, 2, 3, 4]),
                Frame::ClientServerData(vec![1, 2, 3, 4]),
            ]
        );
    }

    #[test]
    fn pull_accepts_datagram_of_announced_size() {
        let mut announcement = vec![0u8; 40];
        announcement[..5].copy_from_slice(&[4, 0, 0, 0, 4]);
        let socket = MockSocket::new();
        socket
            .reply_raw(announcement)
            .reply_raw(vec![11, 4, 0, 0]);
        let mut session = session(&socket);

        assert_eq!(session.pull_from_server().unwrap(), vec![4, 0, 0]);
        assert_eq!(socket.pending_replies(), 0);
    }

    #[test]
    fn pull_rejects_empty_announcement() {
        let socket = MockSocket::new();
        socket.reply(Frame::ServerClientResp { len: 0 });
        let mut session = session(&socket);

        assert!(matches!(
            session.pull_from_server(),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn push_announces_whole_datagram() {
        let socket = MockSocket::new();
        socket
            .reply(Frame::ClientServerResp)
            .reply(Frame::ClientServerRespAck);
        let mut session = session(&socket);

        session.push_to_server(&[1, 2, 3]).unwrap();
        let sent = socket.sent();
        assert_eq!(sent[0].len(), 40);
        assert_eq!(&sent[0][..5], &[6, 0, 0, 0, 4]);
        assert_eq!(sent[1], vec![12, 1, 2, 3]);
        assert_eq!(sent[1].len(), 4);
    }

    #[test]
    fn close_releases_socket() {
        let socket = MockSocket::new();
        socket.reply(Frame::ResetAck);
        let mut session = session(&socket);

        session.close().unwrap();
        assert!(!session.is_open());
        assert!(matches!(
            session.register(1),
            Err(SyncError::Transport { .. })
        ));
    }

    #[test]
    fn release_is_bounded() {
        let socket = MockSocket::new();
        let mut session = session(&socket);

        session.release();
        assert!(!session.is_open());
        assert_eq!(socket.sent_frames(), vec![Frame::Reset; 3]);
        session.release();
        assert_eq!(socket.sent().len(), 3);
    }

    #[test]
    fn send_failure_is_transport_error() {
        let socket = MockSocket::new();
        socket.set_fail_sends(true);
        let mut session = session(&socket);

        let err = session.pull_from_server().unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
    }

    #[test]
    fn oversized_changeset_is_rejected() {
        let socket = MockSocket::new();
        let mut session = session(&socket);

        let payload = vec![0u8; MAX_DATAGRAM_LEN];
        assert!(matches!(
            session.push_to_server(&payload),
            Err(SyncError::Protocol(_))
        ));
        assert!(socket.sent().is_empty());
    }
}
