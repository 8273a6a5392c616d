//! REPLCONF handling.
//!
//! During the handshake a primary answers every REPLCONF with `+OK`. After
//! the handshake, GETACK arrives only on the replica side of a replication
//! link; the ACK it provokes is the single reply allowed to escape a silent
//! connection, so it is surfaced as [`CommandOutcome::Ack`] for the
//! dispatcher to write through the unsuppressed path.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{CommandError, CommandOutcome};
use crate::replication::ReplicationRole;
use crate::resp::RespValue;

pub struct ReplconfArguments {
    option: String,
}

impl ReplconfArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::InvalidReplconfCommand);
        }

        Ok(ReplconfArguments {
            option: arguments[0].clone(),
        })
    }
}

pub async fn replconf(
    replication: &Arc<Mutex<ReplicationRole>>,
    arguments: Vec<String>,
) -> Result<CommandOutcome, CommandError> {
    let replconf_arguments = ReplconfArguments::parse(arguments)?;

    if replconf_arguments.option.eq_ignore_ascii_case("GETACK") {
        let mut guard = replication.lock().await;

        return match guard.as_replica_mut() {
            Some(slave) => Ok(CommandOutcome::Ack(slave.offset)),
            None => Err(CommandError::GetAckOnPrimary),
        };
    }

    Ok(CommandOutcome::Response(
        RespValue::SimpleString("OK".to_string()).encode(),
    ))
}
