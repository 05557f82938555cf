//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::ServerStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

/// Receive buffer size, the largest UDP payload.
const RECV_BUFFER_LEN: usize = 65_507;

/// The sync server.
///
/// Serves one datagram socket. Each peer address gets its own session,
/// and each registered client id its own record set.
///
/// # Example
///
/// ```no_run
/// use todosync_server::{ServerConfig, SyncServer};
///
/// # async fn serve() -> todosync_server::ServerResult<()> {
/// let server = SyncServer::new(ServerConfig::default());
/// server.run(tokio::signal::ctrl_c()).await
/// # }
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ServerStore::new()))
    }

    /// Creates a sync server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// The record store.
    pub fn store(&self) -> Arc<ServerStore> {
        Arc::clone(&self.context.store)
    }

    /// Number of peers with an open session.
    pub fn session_count(&self) -> usize {
        self.context.session_count()
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: Future,
    {
        let socket = UdpSocket::bind(self.context.config.bind_addr).await?;
        self.serve(socket, shutdown).await
    }

    /// Serves an already bound socket until `shutdown` resolves.
    pub async fn serve<F>(&self, socket: UdpSocket, shutdown: F) -> ServerResult<()>
    where
        F: Future,
    {
        tracing::info!(addr = %socket.local_addr()?, "sync server listening");
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = socket.recv_from(&mut buf) => {
                    let (n, peer) = match received {
                        Ok(received) => received,
                        // ICMP port unreachable from a departed peer surfaces here.
                        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
                        Err(e) => return Err(e.into()),
                    };
                    match self.handler.handle_datagram(peer, &buf[..n]) {
                        Ok(Some(reply)) => {
                            let bytes = reply.encode();
                            tracing::trace!(%peer, kind = ?reply.frame_type(), len = bytes.len(), "sending frame");
                            if let Err(e) = socket.send_to(&bytes, peer).await {
                                tracing::warn!(%peer, error = %e, "failed to send reply");
                            }
                        }
                        Ok(None) => {}
                        Err(e) if e.is_client_error() => {
                            tracing::warn!(%peer, error = %e, "rejected request");
                        }
                        Err(e) => tracing::error!(%peer, error = %e, "request failed"),
                    }
                }
            }
        }
        tracing::info!("sync server stopped");
        Ok(())
    }

    /// Starts the server on a background thread with its own runtime.
    ///
    /// The socket is bound before this returns, so the handle's address
    /// is immediately usable.
    pub fn spawn(self) -> ServerResult<ServerHandle> {
        let std_socket = std::net::UdpSocket::bind(self.context.config.bind_addr)?;
        std_socket.set_nonblocking(true)?;
        let local_addr = std_socket.local_addr()?;
        let store = self.store();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("todosync-server".into())
            .spawn(move || -> ServerResult<()> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(async move {
                    let socket = UdpSocket::from_std(std_socket)?;
                    self.serve(socket, shutdown_rx).await
                })
            })?;

        Ok(ServerHandle {
            local_addr,
            store,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

/// Handle to a server running on a background thread.
///
/// Dropping the handle stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    store: Arc<ServerStore>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<ServerResult<()>>>,
}

impl ServerHandle {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The record store.
    pub fn store(&self) -> Arc<ServerStore> {
        Arc::clone(&self.store)
    }

    /// Stops the server and waits for its thread.
    pub fn shutdown(mut self) -> ServerResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> ServerResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ServerError::InvalidRequest("server thread panicked".into()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
