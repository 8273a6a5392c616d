use std::sync::Arc;
use std::time::Duration;

use crate::commands::CommandError;
use crate::key_value_store::KeyValueStore;
use crate::resp::RespValue;

pub struct SetArguments {
    key: String,
    value: String,
    ttl: Option<Duration>,
}

impl SetArguments {
    /// Accepts `key value` or `key value PX <milliseconds>`; the PX keyword
    /// is case-insensitive.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::InvalidSetCommand);
        }

        let mut ttl: Option<Duration> = None;

        if arguments.len() == 4 {
            if !arguments[2].eq_ignore_ascii_case("px") {
                return Err(CommandError::InvalidSetCommandArgument);
            }

            let milliseconds = arguments[3]
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidSetCommandExpiration)?;

            ttl = Some(Duration::from_millis(milliseconds));
        }

        Ok(SetArguments {
            key: arguments[0].clone(),
            value: arguments[1].clone(),
            ttl,
        })
    }
}

pub async fn set(
    store: &Arc<KeyValueStore>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;

    match set_arguments.ttl {
        Some(ttl) => {
            Arc::clone(store)
                .set_with_ttl(set_arguments.key, set_arguments.value, ttl)
                .await
        }
        None => store.set(set_arguments.key, set_arguments.value).await,
    }

    Ok(RespValue::SimpleString("OK".to_string()).encode())
}
