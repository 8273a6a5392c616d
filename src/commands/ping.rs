use crate::commands::CommandError;
use crate::resp::RespValue;

pub struct PingArguments;

impl PingArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if !arguments.is_empty() {
            return Err(CommandError::InvalidPingCommand);
        }

        Ok(PingArguments)
    }
}

pub fn ping(arguments: Vec<String>) -> Result<String, CommandError> {
    PingArguments::parse(arguments)?;

    Ok(RespValue::SimpleString("PONG".to_string()).encode())
}
