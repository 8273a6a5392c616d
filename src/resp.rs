//! RESP value model and wire encoding.
//!
//! The protocol is a RESP-derived text framing: every frame is CRLF
//! terminated except the raw snapshot payload shipped after FULLRESYNC,
//! which is bulk-string framed with no trailing CRLF. Decoding is streaming
//! and lives on [`crate::connection::Connection`] so that the exact number
//! of wire bytes per frame can be accounted for.

use thiserror::Error;

/// Errors produced while decoding frames off the wire.
#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("unexpected leading character '{0}'")]
    UnexpectedSigil(char),
    #[error("invalid length prefix")]
    InvalidLength,
    #[error("declared length does not match read bytes")]
    LengthMismatch,
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("line is not CRLF terminated")]
    MissingCrlf,
    #[error("failed to parse integer")]
    InvalidInteger,
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),
}

#[derive(Debug, PartialEq, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    NullBulkString,
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Serializes this value into its wire representation.
    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(s) => format!("+{}\r\n", s),
            RespValue::Error(s) => format!("-{}\r\n", s),
            RespValue::Integer(i) => format!(":{}\r\n", i),
            RespValue::BulkString(s) => format!("${}\r\n{}\r\n", s.len(), s),
            RespValue::NullBulkString => "$-1\r\n".to_string(),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());
                for element in elements {
                    encoded.push_str(&element.encode());
                }
                encoded
            }
        }
    }

    /// Builds the canonical command form: an array of bulk strings.
    pub fn command<S: AsRef<str>>(fields: &[S]) -> RespValue {
        RespValue::Array(
            fields
                .iter()
                .map(|field| RespValue::BulkString(field.as_ref().to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::RespValue;

    #[test]
    fn test_encode() {
        let test_cases = vec![
            (
                RespValue::SimpleString("PONG".to_string()),
                "+PONG\r\n",
                "simple string",
            ),
            (
                RespValue::Error("ERR invalid PSYNC offset".to_string()),
                "-ERR invalid PSYNC offset\r\n",
                "error",
            ),
            (RespValue::Integer(31), ":31\r\n", "integer"),
            (
                RespValue::BulkString("hey".to_string()),
                "$3\r\nhey\r\n",
                "bulk string",
            ),
            (
                RespValue::BulkString(String::new()),
                "$0\r\n\r\n",
                "empty bulk string",
            ),
            (RespValue::NullBulkString, "$-1\r\n", "null bulk string"),
            (
                RespValue::command(&["SET", "foo", "bar"]),
                "*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
                "command array",
            ),
            (RespValue::Array(Vec::new()), "*0\r\n", "empty array"),
        ];

        for (value, expected, description) in test_cases {
            assert_eq!(value.encode(), expected, "encoding {}", description);
        }
    }

    #[test]
    fn test_command_builds_bulk_string_array() {
        let owned = vec!["REPLCONF".to_string(), "ACK".to_string(), "31".to_string()];

        assert_eq!(
            RespValue::command(&owned).encode(),
            "*3\r\n$8\r\nREPLCONF\r\n$3\r\nACK\r\n$2\r\n31\r\n"
        );
    }
}
