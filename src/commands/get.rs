use std::sync::Arc;

use crate::commands::CommandError;
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct GetArguments {
    key: String,
}

impl GetArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::InvalidGetCommand);
        }

        Ok(GetArguments {
            key: arguments[0].clone(),
        })
    }
}

pub async fn get(
    store: &Arc<KeyValueStore>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    let get_arguments = GetArguments::parse(arguments)?;

    match store.get(&get_arguments.key).await {
        Some(value) => Ok(RespValue::BulkString(value).encode()),
        None => Ok(RespValue::NullBulkString.encode()),
    }
}
