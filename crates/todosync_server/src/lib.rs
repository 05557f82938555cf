//! # todosync Server
//!
//! Reference datagram sync server for todosync.
//!
//! This crate provides:
//! - A UDP serve loop speaking the todosync frame protocol
//! - Per-peer sessions from REGISTER to RESET
//! - Per-client record sets that pushed changesets are applied to
//!
//! # Protocol
//!
//! Each request frame gets exactly one reply:
//! 1. REGISTER → REGISTER_ACK (never sent when registrations are declined)
//! 2. SERVER_CLIENT_SYNC → SERVER_CLIENT_RESP with the snapshot length
//! 3. SERVER_CLIENT_RESP_ACK → SERVER_CLIENT_DATA with the snapshot
//! 4. CLIENT_SERVER_SYNC → CLIENT_SERVER_RESP
//! 5. CLIENT_SERVER_DATA → CLIENT_SERVER_RESP_ACK, applied at most once
//! 6. RESET → RESET_ACK
//!
//! Retransmitted requests get the same reply again.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::{ServerHandle, SyncServer};
pub use store::{ApplyStats, ServerStore};
