use bytes::Bytes;

use crate::commands::{
    echo::echo, get::get, info::info, ping::ping, psync::psync, replconf::replconf, set::set,
    wait::wait, CommandError,
};
use crate::connection::Message;
use crate::replication;
use crate::resp::RespValue;
use crate::server::ServerContext;

/// What the dispatcher should do with a handled command.
#[derive(Debug, PartialEq)]
pub enum CommandOutcome {
    /// Write the encoded reply (discarded on a silent connection).
    Response(String),
    /// Write nothing: unrecognised commands are dropped without a reply.
    Ignored,
    /// Write `REPLCONF ACK <offset>` even on a silent connection.
    Ack(u64),
    /// Write the FULLRESYNC header and the raw snapshot, then promote the
    /// connection to a replica sink.
    FullResync { header: String, snapshot: Bytes },
}

/// A parsed command: its uppercased name and its arguments.
///
/// Command keywords are matched case-insensitively; arguments are kept
/// verbatim so a propagated frame preserves exactly what the client sent.
#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
}

impl CommandHandler {
    pub fn new(message: &Message) -> Result<Self, CommandError> {
        let Some(name) = message.fields.first() else {
            return Err(CommandError::InvalidCommand);
        };

        Ok(CommandHandler {
            name: name.to_uppercase(),
            arguments: message.fields[1..].to_vec(),
        })
    }

    /// Routes this command to its handler. Unrecognised commands produce
    /// [`CommandOutcome::Ignored`] and get no reply.
    ///
    /// On a primary, a successful SET also advances the replication offset
    /// and fans the canonical frame out to every attached replica; the
    /// caller's reply never waits on that fan-out.
    pub async fn handle(&self, ctx: &ServerContext) -> Result<CommandOutcome, CommandError> {
        match self.name.as_str() {
            "PING" => ping(self.arguments.clone()).map(CommandOutcome::Response),
            "ECHO" => echo(self.arguments.clone()).map(CommandOutcome::Response),
            "GET" => get(&ctx.store, self.arguments.clone())
                .await
                .map(CommandOutcome::Response),
            "SET" => {
                let response = set(&ctx.store, self.arguments.clone()).await?;
                replication::propagate(&ctx.replication, self.propagation_frame()).await;

                Ok(CommandOutcome::Response(response))
            }
            "INFO" => info(&ctx.replication, self.arguments.clone())
                .await
                .map(CommandOutcome::Response),
            "REPLCONF" => replconf(&ctx.replication, self.arguments.clone()).await,
            "PSYNC" => psync(&ctx.replication, self.arguments.clone()).await,
            "WAIT" => wait(&ctx.replication, self.arguments.clone())
                .await
                .map(CommandOutcome::Response),
            _ => Ok(CommandOutcome::Ignored),
        }
    }

    /// The canonical frame propagated to replicas: `SET key value` as an
    /// array of bulk strings. Expiry options never propagate, so a replica
    /// keeps the key until another write replaces it. Only meaningful after
    /// the arguments have been validated by the handler.
    pub fn propagation_frame(&self) -> Bytes {
        let fields = [
            self.name.as_str(),
            self.arguments[0].as_str(),
            self.arguments[1].as_str(),
        ];

        Bytes::from(RespValue::command(&fields).encode())
    }
}

#[cfg(test)]
mod tests {
    use super::CommandHandler;
    use crate::connection::Message;

    #[test]
    fn test_propagation_frame_is_canonical() {
        let message = Message {
            fields: vec!["set".to_string(), "foo".to_string(), "bar".to_string()],
            read_bytes: 31,
        };
        let handler = CommandHandler::new(&message).unwrap();

        let frame = handler.propagation_frame();

        assert_eq!(&frame[..], b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(frame.len(), 31);
    }

    #[test]
    fn test_propagation_frame_drops_expiry_arguments() {
        let message = Message {
            fields: vec![
                "SET".to_string(),
                "x".to_string(),
                "1".to_string(),
                "px".to_string(),
                "50".to_string(),
            ],
            read_bytes: 0,
        };
        let handler = CommandHandler::new(&message).unwrap();

        assert_eq!(
            &handler.propagation_frame()[..],
            b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\n1\r\n"
        );
    }
}
