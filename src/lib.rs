//! An in-memory key/value server speaking a RESP-derived text protocol,
//! with primary/replica replication.
//!
//! The crate provides:
//!
//! - A framing codec for the RESP-style wire grammar, including the raw
//!   snapshot payload shipped during full resynchronisation
//! - A concurrent key/value store with per-key expiry (SET PX)
//! - Primary/replica replication: handshake, command propagation, offset
//!   accounting and GETACK-based synchronisation
//! - The WAIT primitive, blocking a client until enough replicas have
//!   acknowledged the primary's current offset or a timeout elapses
//!
//! Concurrent connections are served through async/await with Tokio.

pub mod commands;
pub mod connection;
pub mod dispatcher;
pub mod key_value_store;
pub mod rdb;
pub mod replication;
pub mod resp;
pub mod server;
