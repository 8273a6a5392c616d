use thiserror::Error;

use crate::resp::RespValue;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("invalid command")]
    InvalidCommand,
    #[error("invalid PING command")]
    InvalidPingCommand,
    #[error("invalid ECHO command")]
    InvalidEchoCommand,
    #[error("invalid GET command")]
    InvalidGetCommand,
    #[error("invalid SET command")]
    InvalidSetCommand,
    #[error("invalid SET command argument")]
    InvalidSetCommandArgument,
    #[error("invalid SET command expiration")]
    InvalidSetCommandExpiration,
    #[error("invalid INFO command")]
    InvalidInfoCommand,
    #[error("invalid INFO section")]
    InvalidInfoSection,
    #[error("invalid REPLCONF command")]
    InvalidReplconfCommand,
    #[error("GETACK received on a primary")]
    GetAckOnPrimary,
    #[error("invalid PSYNC command")]
    InvalidPsyncCommand,
    #[error("invalid PSYNC replication ID")]
    InvalidPsyncReplicationId,
    #[error("invalid PSYNC offset")]
    InvalidPsyncOffset,
    #[error("PSYNC received on a replica")]
    PsyncOnReplica,
    #[error("invalid WAIT command")]
    InvalidWaitCommand,
    #[error("invalid WAIT command argument")]
    InvalidWaitCommandArgument,
    #[error("WAIT received on a replica")]
    WaitOnReplica,
}

impl CommandError {
    /// Renders this error as the RESP error frame surfaced to clients.
    pub fn as_string(&self) -> String {
        match self {
            CommandError::InvalidCommand => {
                RespValue::Error("ERR invalid command".to_string()).encode()
            }
            CommandError::InvalidPingCommand => {
                RespValue::Error("ERR wrong number of arguments for 'ping' command".to_string())
                    .encode()
            }
            CommandError::InvalidEchoCommand => {
                RespValue::Error("ERR wrong number of arguments for 'echo' command".to_string())
                    .encode()
            }
            CommandError::InvalidGetCommand => {
                RespValue::Error("ERR wrong number of arguments for 'get' command".to_string())
                    .encode()
            }
            CommandError::InvalidSetCommand => {
                RespValue::Error("ERR wrong number of arguments for 'set' command".to_string())
                    .encode()
            }
            CommandError::InvalidSetCommandArgument => {
                RespValue::Error("ERR invalid SET command argument".to_string()).encode()
            }
            CommandError::InvalidSetCommandExpiration => {
                RespValue::Error("ERR invalid SET command expiration".to_string()).encode()
            }
            CommandError::InvalidInfoCommand => {
                RespValue::Error("ERR wrong number of arguments for 'info' command".to_string())
                    .encode()
            }
            CommandError::InvalidInfoSection => {
                RespValue::Error("ERR invalid INFO section".to_string()).encode()
            }
            CommandError::InvalidReplconfCommand => {
                RespValue::Error("ERR invalid REPLCONF command".to_string()).encode()
            }
            CommandError::GetAckOnPrimary => {
                RespValue::Error("ERR GETACK is only valid on a replica".to_string()).encode()
            }
            CommandError::InvalidPsyncCommand => {
                RespValue::Error("ERR invalid PSYNC command".to_string()).encode()
            }
            CommandError::InvalidPsyncReplicationId => {
                RespValue::Error("ERR invalid PSYNC replication ID".to_string()).encode()
            }
            CommandError::InvalidPsyncOffset => {
                RespValue::Error("ERR invalid PSYNC offset".to_string()).encode()
            }
            CommandError::PsyncOnReplica => {
                RespValue::Error("ERR PSYNC is only valid on a primary".to_string()).encode()
            }
            CommandError::InvalidWaitCommand => {
                RespValue::Error("ERR wrong number of arguments for 'wait' command".to_string())
                    .encode()
            }
            CommandError::InvalidWaitCommandArgument => {
                RespValue::Error("ERR invalid WAIT command argument".to_string()).encode()
            }
            CommandError::WaitOnReplica => {
                RespValue::Error("ERR WAIT is only valid on a primary".to_string()).encode()
            }
        }
    }
}
