use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::{CommandError, CommandOutcome};
use crate::rdb;
use crate::replication::ReplicationRole;
use crate::resp::RespValue;

pub struct PsyncArguments {
    repl_id: String,
}

impl PsyncArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::InvalidPsyncCommand);
        }

        arguments[1]
            .parse::<i64>()
            .map_err(|_| CommandError::InvalidPsyncOffset)?;

        Ok(PsyncArguments {
            repl_id: arguments[0].clone(),
        })
    }
}

/// Answers `PSYNC ? -1` with a full resynchronisation: the FULLRESYNC header
/// followed by the empty snapshot. The dispatcher writes both and promotes
/// the connection to a replica sink.
pub async fn psync(
    replication: &Arc<Mutex<ReplicationRole>>,
    arguments: Vec<String>,
) -> Result<CommandOutcome, CommandError> {
    let psync_arguments = PsyncArguments::parse(arguments)?;

    let mut guard = replication.lock().await;
    let Some(primary) = guard.as_primary_mut() else {
        return Err(CommandError::PsyncOnReplica);
    };

    if psync_arguments.repl_id != "?" && psync_arguments.repl_id != primary.repl_id {
        return Err(CommandError::InvalidPsyncReplicationId);
    }

    let header = RespValue::SimpleString(format!(
        "FULLRESYNC {} {}",
        primary.repl_id, primary.repl_offset
    ))
    .encode();

    Ok(CommandOutcome::FullResync {
        header,
        snapshot: rdb::empty_rdb(),
    })
}
