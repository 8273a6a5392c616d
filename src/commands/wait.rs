//! WAIT: block a client until enough replicas have acknowledged the
//! primary's current offset, or a timeout elapses.
//!
//! The comparison target is the offset before this round's GETACK probe is
//! accounted: the primary's offset includes every probe it has ever sent and
//! a caught-up replica's offset includes every probe it has ever consumed,
//! so a replica that has consumed the full stream acks exactly the pre-probe
//! offset.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout_at, Instant};

use crate::commands::CommandError;
use crate::replication::{ReplicationRole, GETACK_FRAME};
use crate::resp::RespValue;

pub struct WaitArguments {
    required_in_sync: usize,
    timeout: Option<Duration>,
}

impl WaitArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::InvalidWaitCommand);
        }

        let required_in_sync = arguments[0]
            .parse::<usize>()
            .map_err(|_| CommandError::InvalidWaitCommandArgument)?;

        let timeout_ms = arguments[1]
            .parse::<u64>()
            .map_err(|_| CommandError::InvalidWaitCommandArgument)?;

        let timeout = match timeout_ms {
            0 => None,
            _ => Some(Duration::from_millis(timeout_ms)),
        };

        Ok(WaitArguments {
            required_in_sync,
            timeout,
        })
    }
}

pub async fn wait(
    replication: &Arc<Mutex<ReplicationRole>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    let wait_arguments = WaitArguments::parse(arguments)?;

    let (target, pending) = {
        let mut guard = replication.lock().await;
        let Some(primary) = guard.as_primary_mut() else {
            return Err(CommandError::WaitOnReplica);
        };

        let mut known = 0;
        for replica in &primary.replicas {
            if replica.link.lock().await.acked_offset >= primary.repl_offset {
                known += 1;
            }
        }

        if known >= wait_arguments.required_in_sync || known == primary.replicas.len() {
            return Ok(RespValue::Integer(known as i64).encode());
        }

        // The probe joins the replication stream, so it is accounted and
        // enqueued behind every propagated frame before any of its bytes
        // leave this node.
        let target = primary.repl_offset;
        primary.repl_offset += GETACK_FRAME.len() as u64;

        let mut pending = Vec::with_capacity(primary.replicas.len());
        for replica in &primary.replicas {
            match replica.enqueue_probe() {
                Ok(on_wire) => pending.push((Arc::clone(replica), on_wire)),
                Err(e) => {
                    tracing::warn!(replica = %replica.addr, error = %e, "failed to enqueue probe");
                }
            }
        }

        (target, pending)
    };

    let (acks, mut ack_results) = mpsc::channel(pending.len().max(1));
    let sync_tasks: Vec<_> = pending
        .into_iter()
        .map(|(replica, on_wire)| tokio::spawn(replica.sync(on_wire, target, acks.clone())))
        .collect();
    drop(acks);

    let deadline = wait_arguments.timeout.map(|timeout| Instant::now() + timeout);
    let mut in_sync = 0;

    loop {
        let ack = match deadline {
            Some(deadline) => match timeout_at(deadline, ack_results.recv()).await {
                Ok(ack) => ack,
                Err(_) => break,
            },
            None => ack_results.recv().await,
        };

        match ack {
            Some(_) => {
                in_sync += 1;
                if in_sync >= wait_arguments.required_in_sync {
                    break;
                }
            }
            None => break,
        }
    }

    // Abandon pending round trips; a late ACK left on the wire is consumed
    // by the next round and updates the replica's offset then.
    for task in sync_tasks {
        task.abort();
    }

    Ok(RespValue::Integer(in_sync as i64).encode())
}
