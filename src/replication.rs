//! Replication state machine: roles, the replica registry, propagation,
//! GETACK synchronisation and the outbound handshake.
//!
//! All offset reads and advances go through the server-wide replication
//! lock (`Mutex<ReplicationRole>`); an offset advance and the enqueue of the
//! bytes it accounts for happen atomically under it. Lock order is the
//! replication lock before any per-replica link lock, never the reverse.

use std::sync::Arc;

use bytes::Bytes;
use regex::Regex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::connection::{Connection, ConnectionError};
use crate::resp::RespValue;

/// Serialized GETACK probe. Its length is added to the primary offset before
/// each sync round fans out.
pub const GETACK_FRAME: &str = "*3\r\n$8\r\nREPLCONF\r\n$6\r\nGETACK\r\n$1\r\n*\r\n";

#[derive(Error, Debug, PartialEq)]
pub enum ReplicationError {
    #[error("handshake failed at {step}: {reason}")]
    HandshakeFailed { step: &'static str, reason: String },
    #[error("failed to write to replica: {0}")]
    ReplicaWriteFailed(String),
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// Role-specific replication bookkeeping, guarded by the server-wide
/// replication lock.
pub enum ReplicationRole {
    Primary(PrimaryState),
    Replica(SlaveState),
}

impl ReplicationRole {
    pub fn as_primary_mut(&mut self) -> Option<&mut PrimaryState> {
        match self {
            ReplicationRole::Primary(primary) => Some(primary),
            ReplicationRole::Replica(_) => None,
        }
    }

    pub fn as_replica_mut(&mut self) -> Option<&mut SlaveState> {
        match self {
            ReplicationRole::Primary(_) => None,
            ReplicationRole::Replica(slave) => Some(slave),
        }
    }
}

/// State held by a primary: its replication id, the cumulative byte count of
/// everything it has pushed into the replication stream, and the attached
/// replicas.
pub struct PrimaryState {
    pub repl_id: String,
    pub repl_offset: u64,
    pub replicas: Vec<Arc<ReplicaHandle>>,
}

impl PrimaryState {
    pub fn new(repl_id: String) -> Self {
        PrimaryState {
            repl_id,
            repl_offset: 0,
            replicas: Vec::new(),
        }
    }

    pub fn attach_replica(&mut self, replica: Arc<ReplicaHandle>) {
        self.replicas.push(replica);
    }

    pub fn detach_replica(&mut self, addr: &str) {
        self.replicas.retain(|replica| replica.addr != addr);
    }
}

/// State held by a replica: where its primary lives and how many bytes of
/// the post-snapshot command stream it has consumed. The offset is what a
/// REPLCONF ACK echoes back.
pub struct SlaveState {
    pub master_address: String,
    pub offset: u64,
}

impl SlaveState {
    pub fn new(master_address: String) -> Self {
        SlaveState {
            master_address,
            offset: 0,
        }
    }
}

/// Everything the primary puts on a replica's wire: propagated frames and
/// GETACK probes. A probe carries a notifier resolved once it has been
/// written, so a sync round only starts reading after its probe is out.
enum Outbound {
    Frame(Bytes),
    Probe(oneshot::Sender<()>),
}

/// One attached replica as seen by the primary. The link mutex serialises
/// reads and writes on the replica socket. Propagated frames and GETACK
/// probes all go through the outbound queue, whose single writer task
/// delivers them in submission order.
pub struct ReplicaHandle {
    pub addr: String,
    pub link: Arc<Mutex<ReplicaLink>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

pub struct ReplicaLink {
    pub connection: Connection,
    pub acked_offset: u64,
}

impl ReplicaHandle {
    /// Wires up a replica sink: the handle keeps the queue head and a writer
    /// task drains the queue onto the socket one frame at a time. The task
    /// ends when the handle is dropped or a write fails.
    pub fn attach(
        addr: String,
        connection: Connection,
        replication: &Arc<Mutex<ReplicationRole>>,
    ) -> Arc<Self> {
        let (outbound, frames) = mpsc::unbounded_channel();
        let link = Arc::new(Mutex::new(ReplicaLink {
            connection,
            acked_offset: 0,
        }));

        tokio::spawn(run_outbound_writer(
            addr.clone(),
            Arc::clone(&link),
            frames,
            Arc::clone(replication),
        ));

        Arc::new(ReplicaHandle {
            addr,
            link,
            outbound,
        })
    }

    fn enqueue(&self, frame: Bytes) -> Result<(), ReplicationError> {
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| ReplicationError::ReplicaWriteFailed("writer task is gone".to_string()))
    }

    /// Queues a GETACK probe behind every frame already enqueued, so the
    /// probe cannot overtake propagated commands on the wire. The returned
    /// receiver resolves once the probe has been written.
    pub fn enqueue_probe(&self) -> Result<oneshot::Receiver<()>, ReplicationError> {
        let (written, on_wire) = oneshot::channel();

        self.outbound
            .send(Outbound::Probe(written))
            .map_err(|_| ReplicationError::ReplicaWriteFailed("writer task is gone".to_string()))?;

        Ok(on_wire)
    }

    /// One GETACK round trip: wait for the queued probe to reach the wire,
    /// read exactly one inbound frame, record the acked offset, and report
    /// it on the channel when the replica has caught up to `target`.
    pub async fn sync(
        self: Arc<Self>,
        on_wire: oneshot::Receiver<()>,
        target: u64,
        acks: mpsc::Sender<u64>,
    ) {
        if on_wire.await.is_err() {
            tracing::warn!(replica = %self.addr, "probe dropped before reaching the wire");
            return;
        }

        let mut link = self.link.lock().await;

        let message = match link.connection.next_frame().await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(replica = %self.addr, error = %e, "failed to read GETACK reply");
                return;
            }
        };

        let offset = match message.parse_replconf_ack() {
            Ok(offset) => offset,
            Err(e) => {
                tracing::warn!(replica = %self.addr, error = %e, "unexpected GETACK reply");
                return;
            }
        };

        link.acked_offset = offset;
        tracing::debug!(replica = %self.addr, offset, "replica acknowledged offset");

        if offset >= target {
            let _ = acks.send(offset).await;
        }
    }
}

/// Advances the primary offset by the frame length and enqueues the frame
/// for every attached replica. Offset advance and enqueue are atomic under
/// the replication lock; enqueueing never blocks, so the caller's reply
/// never waits on replica sockets. Per-replica writer tasks deliver queued
/// frames in order, concurrently across replicas. No-op on a replica.
pub async fn propagate(replication: &Arc<Mutex<ReplicationRole>>, frame: Bytes) {
    let mut guard = replication.lock().await;
    let Some(primary) = guard.as_primary_mut() else {
        return;
    };

    primary.repl_offset += frame.len() as u64;

    for replica in &primary.replicas {
        if let Err(e) = replica.enqueue(frame.clone()) {
            tracing::warn!(replica = %replica.addr, error = %e, "failed to enqueue frame");
        }
    }
}

/// Drains one replica's outbound queue in submission order. A failed write
/// detaches the replica from the registry; the replica stream stays a FIFO
/// because this task is the queue's only consumer.
async fn run_outbound_writer(
    addr: String,
    link: Arc<Mutex<ReplicaLink>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    replication: Arc<Mutex<ReplicationRole>>,
) {
    while let Some(item) = outbound.recv().await {
        let (frame, notify) = match item {
            Outbound::Frame(frame) => (frame, None),
            Outbound::Probe(written) => {
                (Bytes::from_static(GETACK_FRAME.as_bytes()), Some(written))
            }
        };

        let written = {
            let mut link = link.lock().await;
            link.connection.write_frame(&frame).await
        };

        if let Err(e) = written {
            tracing::warn!(
                replica = %addr,
                error = %e,
                "dropping replica after failed propagation"
            );

            let mut guard = replication.lock().await;
            if let Some(primary) = guard.as_primary_mut() {
                primary.detach_replica(&addr);
            }

            return;
        }

        if let Some(notify) = notify {
            let _ = notify.send(());
        }
    }
}

/// Drives the fixed four-step handshake on a fresh connection to the
/// primary: PING, REPLCONF listening-port, REPLCONF capa, PSYNC, then the
/// snapshot transfer. After this returns the connection carries the inbound
/// command stream and should be marked silent.
pub async fn perform_handshake(
    connection: &mut Connection,
    listening_port: u16,
) -> Result<(), ReplicationError> {
    let reply = exchange(connection, &["PING"], "PING").await?;
    if !reply.eq_ignore_ascii_case("PONG") {
        return Err(unexpected_reply("PING", &reply));
    }

    let port = listening_port.to_string();
    let reply = exchange(
        connection,
        &["REPLCONF", "listening-port", &port],
        "REPLCONF listening-port",
    )
    .await?;
    if !reply.eq_ignore_ascii_case("OK") {
        return Err(unexpected_reply("REPLCONF listening-port", &reply));
    }

    let reply = exchange(connection, &["REPLCONF", "capa", "psync2"], "REPLCONF capa").await?;
    if !reply.eq_ignore_ascii_case("OK") {
        return Err(unexpected_reply("REPLCONF capa", &reply));
    }

    let reply = exchange(connection, &["PSYNC", "?", "-1"], "PSYNC").await?;
    validate_fullresync(&reply)?;

    connection
        .parse_rdb_payload()
        .await
        .map_err(|e| ReplicationError::HandshakeFailed {
            step: "snapshot transfer",
            reason: e.to_string(),
        })?;

    Ok(())
}

async fn exchange(
    connection: &mut Connection,
    fields: &[&str],
    step: &'static str,
) -> Result<String, ReplicationError> {
    let frame = RespValue::command(fields).encode();

    connection
        .write_frame(frame.as_bytes())
        .await
        .map_err(|e| ReplicationError::HandshakeFailed {
            step,
            reason: e.to_string(),
        })?;

    connection
        .read_simple_string()
        .await
        .map_err(|e| ReplicationError::HandshakeFailed {
            step,
            reason: e.to_string(),
        })
}

fn validate_fullresync(reply: &str) -> Result<(), ReplicationError> {
    let parts: Vec<&str> = reply.split_whitespace().collect();

    let valid = parts.len() == 3
        && parts[0].eq_ignore_ascii_case("FULLRESYNC")
        && is_valid_repl_id(parts[1])
        && parts[2].parse::<u64>().is_ok();

    if !valid {
        return Err(unexpected_reply("PSYNC", reply));
    }

    Ok(())
}

fn is_valid_repl_id(repl_id: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9]{40}$").unwrap();
    re.is_match(repl_id)
}

fn unexpected_reply(step: &'static str, reply: &str) -> ReplicationError {
    ReplicationError::HandshakeFailed {
        step,
        reason: format!("unexpected reply '{}'", reply),
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_repl_id, validate_fullresync, GETACK_FRAME};
    use crate::resp::RespValue;

    #[test]
    fn test_getack_frame_is_the_canonical_encoding() {
        assert_eq!(
            GETACK_FRAME,
            RespValue::command(&["REPLCONF", "GETACK", "*"]).encode()
        );
        assert_eq!(GETACK_FRAME.len(), 37);
    }

    #[test]
    fn test_is_valid_repl_id() {
        let test_cases = vec![
            ("8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb", true, "40 hex chars"),
            ("abcDEF0123456789abcDEF0123456789abcDEF01", true, "mixed case"),
            ("8371b4fb1155b71f4a04d3e1bc3e18c4a990aee", false, "39 chars"),
            ("8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb1", false, "41 chars"),
            ("8371b4fb-155b71f4a04d3e1bc3e18c4a990aeeb", false, "non-alphanumeric"),
            ("", false, "empty"),
        ];

        for (repl_id, expected, description) in test_cases {
            assert_eq!(is_valid_repl_id(repl_id), expected, "{}", description);
        }
    }

    #[test]
    fn test_validate_fullresync() {
        let test_cases = vec![
            (
                "FULLRESYNC 8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb 0",
                true,
                "valid reply",
            ),
            (
                "fullresync 8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb 31",
                true,
                "case-insensitive keyword",
            ),
            ("FULLRESYNC 0", false, "missing repl id"),
            (
                "FULLRESYNC short 0",
                false,
                "invalid repl id",
            ),
            (
                "FULLRESYNC 8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb x",
                false,
                "non-numeric offset",
            ),
            ("CONTINUE", false, "wrong keyword"),
        ];

        for (reply, expected_ok, description) in test_cases {
            assert_eq!(
                validate_fullresync(reply).is_ok(),
                expected_ok,
                "{}",
                description
            );
        }
    }
}
