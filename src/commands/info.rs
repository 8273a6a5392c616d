use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::CommandError;
use crate::replication::ReplicationRole;
use crate::resp::RespValue;

enum InfoSection {
    Replication,
}

struct InfoArguments {
    section: InfoSection,
}

impl InfoArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::InvalidInfoCommand);
        }

        if !arguments[0].eq_ignore_ascii_case("replication") {
            return Err(CommandError::InvalidInfoSection);
        }

        Ok(InfoArguments {
            section: InfoSection::Replication,
        })
    }
}

pub async fn info(
    replication: &Arc<Mutex<ReplicationRole>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    let info_arguments = InfoArguments::parse(arguments)?;

    let guard = replication.lock().await;

    let body = match info_arguments.section {
        InfoSection::Replication => match &*guard {
            ReplicationRole::Primary(primary) => format!(
                "role:master\nmaster_replid:{}\nmaster_repl_offset:{}\n",
                primary.repl_id, primary.repl_offset
            ),
            ReplicationRole::Replica(_) => "role:slave\n".to_string(),
        },
    };

    Ok(RespValue::BulkString(body).encode())
}
