//! Per-connection dispatch loops.
//!
//! One loop per accepted client connection, and one loop on a replica for
//! the silent link carrying the primary's command stream. Commands on a
//! single connection are processed strictly in arrival order.

use crate::commands::{CommandHandler, CommandOutcome};
use crate::connection::{Connection, ConnectionError};
use crate::replication::ReplicaHandle;
use crate::server::ServerContext;

/// Serves one client connection until the peer disconnects or the
/// connection is promoted to a replica sink by PSYNC. A promoted connection
/// is handed to the replica registry without being closed.
pub async fn handle_client_connection(mut connection: Connection, addr: String, ctx: ServerContext) {
    loop {
        let message = match connection.next_frame().await {
            Ok(message) => message,
            Err(ConnectionError::Closed) => {
                tracing::debug!(client = %addr, "client disconnected");
                return;
            }
            Err(ConnectionError::Io(e)) => {
                tracing::warn!(client = %addr, error = %e, "dropping connection after I/O error");
                return;
            }
            Err(e) => {
                tracing::warn!(client = %addr, error = %e, "protocol error");
                continue;
            }
        };

        let handler = match CommandHandler::new(&message) {
            Ok(handler) => handler,
            Err(e) => {
                if let Err(e) = connection.write_frame(e.as_string().as_bytes()).await {
                    tracing::warn!(client = %addr, error = %e, "failed to write error reply");
                    return;
                }
                continue;
            }
        };

        match handler.handle(&ctx).await {
            Ok(CommandOutcome::Response(response)) => {
                if let Err(e) = connection.write_frame(response.as_bytes()).await {
                    tracing::warn!(client = %addr, error = %e, "failed to write reply");
                    return;
                }
            }
            Ok(CommandOutcome::Ignored) => {
                tracing::debug!(client = %addr, command = %handler.name, "ignoring unknown command");
            }
            Ok(CommandOutcome::Ack(offset)) => {
                if let Err(e) = connection.reply_getack(offset).await {
                    tracing::warn!(client = %addr, error = %e, "failed to write ACK");
                    return;
                }
            }
            Ok(CommandOutcome::FullResync { header, snapshot }) => {
                let framed_snapshot = format!("${}\r\n", snapshot.len());

                let written = async {
                    connection.write_frame(header.as_bytes()).await?;
                    connection.write_frame(framed_snapshot.as_bytes()).await?;
                    // The snapshot payload carries no trailing CRLF.
                    connection.write_frame(&snapshot).await
                }
                .await;

                if let Err(e) = written {
                    tracing::warn!(client = %addr, error = %e, "failed to stream snapshot");
                    return;
                }

                let replica = ReplicaHandle::attach(addr.clone(), connection, &ctx.replication);
                {
                    let mut guard = ctx.replication.lock().await;
                    if let Some(primary) = guard.as_primary_mut() {
                        primary.attach_replica(replica);
                    }
                }

                tracing::info!(replica = %addr, "client promoted to replica sink");
                return;
            }
            Err(e) => {
                tracing::debug!(client = %addr, command = %handler.name, error = %e, "command failed");
                if let Err(e) = connection.write_frame(e.as_string().as_bytes()).await {
                    tracing::warn!(client = %addr, error = %e, "failed to write error reply");
                    return;
                }
            }
        }
    }
}

/// Consumes the primary's command stream on a replica.
///
/// Replies are suppressed by the connection's silent flag except GETACK
/// acknowledgements. Every inbound frame advances the replica offset by its
/// exact wire length whether or not the handler succeeded, and only after
/// any ACK for that frame has been written, so the ACK reports the bytes
/// consumed before the probe itself.
pub async fn handle_primary_link(mut connection: Connection, ctx: ServerContext) {
    loop {
        let message = match connection.next_frame().await {
            Ok(message) => message,
            Err(ConnectionError::Closed) => {
                tracing::info!("primary closed the replication stream");
                return;
            }
            Err(ConnectionError::Io(e)) => {
                tracing::warn!(error = %e, "I/O error on the replication stream");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "protocol error on the replication stream");
                continue;
            }
        };

        match CommandHandler::new(&message) {
            Ok(handler) => match handler.handle(&ctx).await {
                Ok(CommandOutcome::Response(response)) => {
                    // Discarded by the silent flag.
                    if let Err(e) = connection.write_frame(response.as_bytes()).await {
                        tracing::warn!(error = %e, "failed to write on the replication stream");
                        return;
                    }
                }
                Ok(CommandOutcome::Ignored) => {
                    tracing::debug!(command = %handler.name, "ignoring unknown command from primary");
                }
                Ok(CommandOutcome::Ack(offset)) => {
                    if let Err(e) = connection.reply_getack(offset).await {
                        tracing::warn!(error = %e, "failed to acknowledge GETACK");
                        return;
                    }
                }
                Ok(CommandOutcome::FullResync { .. }) => {
                    // PSYNC is rejected on a replica before producing this.
                }
                Err(e) => {
                    tracing::debug!(command = %handler.name, error = %e, "command from primary failed");
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "unparseable command from primary");
            }
        }

        let mut guard = ctx.replication.lock().await;
        if let Some(slave) = guard.as_replica_mut() {
            slave.offset += message.read_bytes as u64;
        }
    }
}
