//! WAL-based peer replication.
//!
//! Replication is peer-to-peer, bidirectional, stream-based, and
//! eventually consistent. Every node can run a
//! [`ReplicationServer`](server::ReplicationServer) accepting
//! subscriptions and any number of client sessions subscribing to
//! configured peers.
//!
//! # Protocol
//!
//! 1. Client sends `Subscribe { tenant, device_id, watermark, auth_token }`.
//! 2. Server answers `Connected { current_seq }`.
//! 3. Server streams historical entries (`seq > watermark`) in batches of
//!    up to 100, then switches to live streaming.
//! 4. Client verifies each entry's checksum and sequence density, applies
//!    it through the last-write-wins path, persists its
//!    `(peer_id, seq)` checkpoint, and acks.
//! 5. On any failure the stream tears down; the next subscribe resumes
//!    from the durable checkpoint.
//!
//! Conflicts converge by last-write-wins on
//! `(modified_at desc, origin node id asc)`. The same protocol serves
//! cluster peers and intermittently-connected edge devices; only the
//! backoff policy differs ([`crate::config::ReplicationConfig`]).

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{replicate_from, sync_once, Peer};
pub use protocol::{ErrorCode, SyncRequest, SyncResponse};
pub use server::ReplicationServer;
