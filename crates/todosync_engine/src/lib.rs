//! # todosync Engine
//!
//! Client side of todosync replication.
//!
//! This crate provides:
//! - A stop-and-wait UDP transport session with retransmission
//! - The task store contract and an in-memory, JSON-persisted store
//! - Per-record reconciliation against the server's snapshot
//! - A supervised sync run with progress events and conflict prompts
//!
//! ## Architecture
//!
//! A run follows a fixed sequence:
//! 1. Register the client with the server
//! 2. Pull the server's full record set into a mirror
//! 3. Reconcile every local record against the mirror
//! 4. Push new records, deletions and updates in one changeset
//! 5. Reset the session and discard the mirror
//!
//! ## Key Invariants
//!
//! - The server is the source of truth for identifiers
//! - Nothing is written to the store until the whole snapshot decodes
//! - At most one run is in progress per orchestrator
//! - The mirror never outlives a run

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod orchestrator;
mod reconcile;
mod store;
mod transport;

pub use config::{SyncConfig, TransportConfig};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{
    ConflictMode, ConflictPrompt, ProgressEvent, RunContext, RunReport, SyncHandle,
    SyncOrchestrator, SyncPhase,
};
pub use reconcile::{
    classify, Case, Classification, DecisionMaker, MirrorState, Observation, ReconcileReport,
    Reconciler,
};
pub use store::{MemoryStore, MirrorEntry, TaskStore};
pub use transport::{
    connect_udp, DatagramSocket, MockSocket, TransportSession, MAX_DATAGRAM_LEN,
};
