//! Buffered, byte-accounted framing over a TCP stream.
//!
//! A [`Connection`] owns both halves of a stream and parses one frame at a
//! time. Every parsed [`Message`] carries `read_bytes`, the exact number of
//! wire bytes consumed to produce it; replica-side offset accounting depends
//! on that number being exact.
//!
//! The `silent` flag exists because the same connection serves dual duty on
//! a replica: during the handshake it produces real bytes on the wire, but
//! once it becomes the inbound command stream from the primary, replies must
//! not pollute the primary-bound channel. The single exception is the ACK
//! reply to GETACK, emitted via [`Connection::reply_getack`].

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::resp::{RespError, RespValue};

#[derive(Error, Debug, PartialEq)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("connection closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(#[from] RespError),
}

/// One parsed array frame: its text fields plus the exact wire byte count.
#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub fields: Vec<String>,
    pub read_bytes: usize,
}

impl Message {
    /// Interprets this frame as `REPLCONF ACK <offset>`.
    pub fn parse_replconf_ack(&self) -> Result<u64, RespError> {
        if self.fields.len() != 3
            || !self.fields[0].eq_ignore_ascii_case("REPLCONF")
            || !self.fields[1].eq_ignore_ascii_case("ACK")
        {
            return Err(RespError::UnexpectedFrame(self.fields.join(" ")));
        }

        self.fields[2]
            .parse::<u64>()
            .map_err(|_| RespError::InvalidInteger)
    }
}

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    silent: bool,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();

        Connection {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            silent: false,
        }
    }

    /// When silent, replies written through [`Connection::write_frame`] are
    /// discarded; reads and byte accounting continue unaffected.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Parses exactly one array frame. Array elements may be bulk strings or
    /// simple strings.
    pub async fn next_frame(&mut self) -> Result<Message, ConnectionError> {
        let (lead, mut read_bytes) = self.read_line().await?;

        let Some(count) = lead.strip_prefix('*') else {
            return Err(RespError::UnexpectedSigil(leading_char(&lead)).into());
        };
        let count = count
            .parse::<usize>()
            .map_err(|_| RespError::InvalidLength)?;

        let mut fields = Vec::with_capacity(count);

        for _ in 0..count {
            let (field, field_bytes) = self.next_field().await?;
            fields.push(field);
            read_bytes += field_bytes;
        }

        Ok(Message { fields, read_bytes })
    }

    /// Reads one `+<text>` reply line, as produced during the handshake.
    pub async fn read_simple_string(&mut self) -> Result<String, ConnectionError> {
        let (line, _) = self.read_line().await?;

        match line.strip_prefix('+') {
            Some(text) => Ok(text.to_string()),
            None => Err(RespError::UnexpectedSigil(leading_char(&line)).into()),
        }
    }

    /// Reads `$<n>\r\n` followed by exactly `n` raw bytes. The snapshot
    /// payload carries no trailing CRLF, unlike an ordinary bulk string.
    pub async fn parse_rdb_payload(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let (lead, _) = self.read_line().await?;

        let Some(length) = lead.strip_prefix('$') else {
            return Err(RespError::UnexpectedSigil(leading_char(&lead)).into());
        };
        let length = length
            .parse::<usize>()
            .map_err(|_| RespError::InvalidLength)?;

        let mut payload = vec![0u8; length];
        self.reader
            .read_exact(&mut payload)
            .await
            .map_err(map_io_error)?;

        Ok(payload)
    }

    /// Writes the given bytes and flushes, unless this connection is silent.
    pub async fn write_frame(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        if self.silent {
            return Ok(());
        }

        self.writer.write_all(bytes).await.map_err(map_io_error)?;
        self.writer.flush().await.map_err(map_io_error)?;

        Ok(())
    }

    /// Writes `REPLCONF ACK <offset>`. This is the one reply a replica owes
    /// its primary, so it bypasses the silent flag.
    pub async fn reply_getack(&mut self, offset: u64) -> Result<(), ConnectionError> {
        let frame = RespValue::command(&["REPLCONF", "ACK", &offset.to_string()]).encode();

        self.writer
            .write_all(frame.as_bytes())
            .await
            .map_err(map_io_error)?;
        self.writer.flush().await.map_err(map_io_error)?;

        Ok(())
    }

    // One CRLF-terminated line, without the terminator, plus its wire length.
    async fn read_line(&mut self) -> Result<(String, usize), ConnectionError> {
        let mut buffer = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut buffer)
            .await
            .map_err(map_io_error)?;

        if read == 0 {
            return Err(ConnectionError::Closed);
        }
        if !buffer.ends_with(b"\r\n") {
            return Err(RespError::MissingCrlf.into());
        }

        buffer.truncate(buffer.len() - 2);
        let line = String::from_utf8(buffer).map_err(|_| RespError::InvalidUtf8)?;

        Ok((line, read))
    }

    async fn next_field(&mut self) -> Result<(String, usize), ConnectionError> {
        let (lead, mut read_bytes) = self.read_line().await?;

        if let Some(text) = lead.strip_prefix('+') {
            return Ok((text.to_string(), read_bytes));
        }

        let Some(length) = lead.strip_prefix('$') else {
            return Err(RespError::UnexpectedSigil(leading_char(&lead)).into());
        };
        let length = length
            .parse::<usize>()
            .map_err(|_| RespError::InvalidLength)?;

        let (data, data_bytes) = self.read_line().await?;
        read_bytes += data_bytes;

        if data.len() != length {
            return Err(RespError::LengthMismatch.into());
        }

        Ok((data, read_bytes))
    }
}

fn leading_char(line: &str) -> char {
    line.chars().next().unwrap_or(' ')
}

fn map_io_error(error: std::io::Error) -> ConnectionError {
    if error.kind() == std::io::ErrorKind::UnexpectedEof {
        ConnectionError::Closed
    } else {
        ConnectionError::Io(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::Message;
    use crate::resp::RespError;

    #[test]
    fn test_parse_replconf_ack() {
        let test_cases = vec![
            (vec!["REPLCONF", "ACK", "31"], Ok(31), "uppercase ack"),
            (vec!["replconf", "ack", "0"], Ok(0), "lowercase ack"),
            (
                vec!["REPLCONF", "ACK"],
                Err(RespError::UnexpectedFrame("REPLCONF ACK".to_string())),
                "missing offset",
            ),
            (
                vec!["SET", "foo", "bar"],
                Err(RespError::UnexpectedFrame("SET foo bar".to_string())),
                "not an ack",
            ),
            (
                vec!["REPLCONF", "ACK", "many"],
                Err(RespError::InvalidInteger),
                "non-numeric offset",
            ),
        ];

        for (fields, expected, description) in test_cases {
            let message = Message {
                fields: fields.into_iter().map(String::from).collect(),
                read_bytes: 0,
            };
            assert_eq!(message.parse_replconf_ack(), expected, "{}", description);
        }
    }
}
