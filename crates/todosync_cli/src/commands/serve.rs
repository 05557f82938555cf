//! Serve command implementation.

use std::net::SocketAddr;
use todosync_server::{ServerConfig, SyncServer};

/// Runs the reference server until Ctrl-C.
pub async fn run(bind: SocketAddr, decline: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::new(bind);
    if decline {
        config = config.declining();
    }
    let server = SyncServer::new(config);
    server
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
