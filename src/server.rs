//! Server configuration and orchestration.
//!
//! Parses the command line, builds the shared context (store + replication
//! state), and runs the accept loop. A server configured as a replica first
//! drives the outbound handshake against its primary and then reuses that
//! same connection, marked silent, as the inbound command stream.

use std::sync::Arc;

use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::connection::Connection;
use crate::dispatcher::{handle_client_connection, handle_primary_link};
use crate::key_value_store::KeyValueStore;
use crate::replication::{
    perform_handshake, PrimaryState, ReplicationError, ReplicationRole, SlaveState,
};

/// Errors that can occur during command-line argument parsing.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("invalid port flag value")]
    InvalidPortFlagValue,
    #[error("invalid master address")]
    InvalidMasterAddress,
    #[error("invalid master port")]
    InvalidMasterPort,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to listen on port {port}: {reason}")]
    Listen { port: u16, reason: String },
    #[error("failed to connect to primary at {address}: {reason}")]
    Connect { address: String, reason: String },
    #[error(transparent)]
    Handshake(#[from] ReplicationError),
}

/// The role a server runs in: a write-accepting primary, or a replica
/// following the primary at the given host and port.
#[derive(Debug, PartialEq, Clone)]
pub enum ServerRole {
    Primary,
    Replica { host: String, port: u16 },
}

/// Shared state handed to every connection task.
#[derive(Clone)]
pub struct ServerContext {
    pub store: Arc<KeyValueStore>,
    pub replication: Arc<Mutex<ReplicationRole>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct KvServer {
    pub port: u16,
    pub role: ServerRole,
    pub repl_id: String,
}

impl KvServer {
    /// Creates a server from command-line arguments.
    ///
    /// # Supported Arguments
    ///
    /// * `--port <port>` - Port number to listen on (default: 6379)
    /// * `--replicaof <host> <port>` - Follow the primary at host/port; the
    ///   port is consumed as the next positional argument (legacy two-token
    ///   form)
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut port: Option<u16> = None;
        let mut role: Option<ServerRole> = None;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let Some(port_str) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    port = Some(validate_port(&port_str, CliError::InvalidPortFlagValue)?);
                }
                "--replicaof" => {
                    let Some(host) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };
                    let Some(master_port) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    validate_master_host(&host)?;
                    let master_port = validate_port(&master_port, CliError::InvalidMasterPort)?;

                    role = Some(ServerRole::Replica {
                        host,
                        port: master_port,
                    });
                }
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        Ok(KvServer {
            port: port.unwrap_or(6379),
            role: role.unwrap_or(ServerRole::Primary),
            repl_id: Alphanumeric.sample_string(&mut rand::rng(), 40),
        })
    }

    /// Builds the shared context for this server's role.
    pub fn context(&self) -> ServerContext {
        let replication = match &self.role {
            ServerRole::Primary => {
                ReplicationRole::Primary(PrimaryState::new(self.repl_id.clone()))
            }
            ServerRole::Replica { host, port } => {
                ReplicationRole::Replica(SlaveState::new(format!("{}:{}", host, port)))
            }
        };

        ServerContext {
            store: Arc::new(KeyValueStore::new()),
            replication: Arc::new(Mutex::new(replication)),
        }
    }

    /// Runs the server until a fatal error occurs.
    ///
    /// A replica first connects to its primary, performs the handshake, and
    /// consumes the replication stream on that same connection in a
    /// background task. Both roles then accept client connections.
    pub async fn run(&self) -> Result<(), ServerError> {
        let ctx = self.context();

        if let ServerRole::Replica { host, port } = &self.role {
            let address = format!("{}:{}", host, port);

            let stream =
                TcpStream::connect(&address)
                    .await
                    .map_err(|e| ServerError::Connect {
                        address: address.clone(),
                        reason: e.to_string(),
                    })?;

            let mut connection = Connection::new(stream);
            perform_handshake(&mut connection, self.port).await?;
            connection.set_silent(true);

            tracing::info!(primary = %address, "handshake complete, consuming replication stream");

            let ctx = ctx.clone();
            tokio::spawn(async move {
                handle_primary_link(connection, ctx).await;
            });
        }

        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .map_err(|e| ServerError::Listen {
                port: self.port,
                reason: e.to_string(),
            })?;

        tracing::info!(port = self.port, "listening");

        serve(listener, ctx).await;

        Ok(())
    }
}

/// Accept loop: one task per client connection.
pub async fn serve(listener: TcpListener, ctx: ServerContext) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let ctx = ctx.clone();

                tokio::spawn(async move {
                    handle_client_connection(Connection::new(stream), addr.to_string(), ctx).await;
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to accept connection");
            }
        }
    }
}

fn validate_port(port: &str, error: CliError) -> Result<u16, CliError> {
    let port_number = port.parse::<u16>().map_err(|_| error.clone())?;

    if port_number == 0 {
        return Err(error);
    }

    Ok(port_number)
}

/// A master host is an IPv4 address with in-range octets, or a hostname.
fn validate_master_host(host: &str) -> Result<(), CliError> {
    let ipv4_regex = Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").unwrap();
    let hostname_regex = Regex::new(r"^[a-zA-Z0-9\-\.]+$").unwrap();

    let valid = if let Some(caps) = ipv4_regex.captures(host) {
        caps.iter().skip(1).all(|octet| {
            octet
                .map(|m| m.as_str().parse::<u16>().map(|v| v <= 255).unwrap_or(false))
                .unwrap_or(false)
        })
    } else {
        hostname_regex.is_match(host)
    };

    if !valid {
        return Err(CliError::InvalidMasterAddress);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port() {
        let test_cases = [
            ("6379", Ok(6379), "valid standard port"),
            ("1", Ok(1), "minimum valid port"),
            ("65535", Ok(65535), "maximum valid port"),
            ("0", Err(CliError::InvalidPortFlagValue), "zero port"),
            ("65536", Err(CliError::InvalidPortFlagValue), "port too high"),
            (
                "not_a_number",
                Err(CliError::InvalidPortFlagValue),
                "invalid format",
            ),
            ("-1", Err(CliError::InvalidPortFlagValue), "negative port"),
            ("", Err(CliError::InvalidPortFlagValue), "empty string"),
        ];

        for (input, expected, description) in test_cases {
            assert_eq!(
                validate_port(input, CliError::InvalidPortFlagValue),
                expected,
                "{}: {}",
                description,
                input
            );
        }
    }

    #[test]
    fn test_validate_master_host() {
        let test_cases = [
            ("127.0.0.1", Ok(()), "valid IPv4 address"),
            ("localhost", Ok(()), "valid hostname"),
            ("redis-master.example.com", Ok(()), "valid domain"),
            ("256.0.0.1", Err(CliError::InvalidMasterAddress), "octet out of range"),
            ("my_host!", Err(CliError::InvalidMasterAddress), "invalid characters"),
            ("", Err(CliError::InvalidMasterAddress), "empty string"),
        ];

        for (input, expected, description) in test_cases {
            assert_eq!(
                validate_master_host(input),
                expected,
                "{}: {}",
                description,
                input
            );
        }
    }

    #[test]
    fn test_server_creation_without_flags() {
        let args = vec!["replikv".to_string()];

        let server = KvServer::new(args).unwrap();

        assert_eq!(server.port, 6379);
        assert_eq!(server.role, ServerRole::Primary);
        assert_eq!(server.repl_id.len(), 40);
    }

    #[test]
    fn test_server_creation_success_cases() {
        let test_cases = vec![
            (
                vec!["replikv".to_string()],
                6379,
                ServerRole::Primary,
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--port".to_string(),
                    "6677".to_string(),
                ],
                6677,
                ServerRole::Primary,
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--replicaof".to_string(),
                    "127.0.0.1".to_string(),
                    "6380".to_string(),
                ],
                6379,
                ServerRole::Replica {
                    host: "127.0.0.1".to_string(),
                    port: 6380,
                },
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--port".to_string(),
                    "7000".to_string(),
                    "--replicaof".to_string(),
                    "localhost".to_string(),
                    "6381".to_string(),
                ],
                7000,
                ServerRole::Replica {
                    host: "localhost".to_string(),
                    port: 6381,
                },
            ),
        ];

        for (args, expected_port, expected_role) in test_cases {
            let server = KvServer::new(args).unwrap();
            assert_eq!(server.port, expected_port);
            assert_eq!(server.role, expected_role);
        }
    }

    #[test]
    fn test_server_creation_with_invalid_flags() {
        let test_cases = vec![
            (
                vec!["replikv".to_string(), "--port".to_string()],
                CliError::InvalidCommandLineFlag,
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--port".to_string(),
                    "invalid".to_string(),
                ],
                CliError::InvalidPortFlagValue,
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--port".to_string(),
                    "70000".to_string(),
                ],
                CliError::InvalidPortFlagValue,
            ),
            (
                vec!["replikv".to_string(), "invalid".to_string()],
                CliError::InvalidCommandLineFlag,
            ),
            (
                vec!["replikv".to_string(), "--replicaof".to_string()],
                CliError::InvalidCommandLineFlag,
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--replicaof".to_string(),
                    "127.0.0.1".to_string(),
                ],
                CliError::InvalidCommandLineFlag,
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--replicaof".to_string(),
                    "127.0.0.1".to_string(),
                    "invalid".to_string(),
                ],
                CliError::InvalidMasterPort,
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--replicaof".to_string(),
                    "256.0.0.1".to_string(),
                    "6379".to_string(),
                ],
                CliError::InvalidMasterAddress,
            ),
            (
                vec![
                    "replikv".to_string(),
                    "--replicaof".to_string(),
                    "my_host!".to_string(),
                    "6379".to_string(),
                ],
                CliError::InvalidMasterAddress,
            ),
        ];

        for (args, expected_error) in test_cases {
            let result = KvServer::new(args);
            assert_eq!(result, Err(expected_error.clone()), "args: {:?}", expected_error);
        }
    }
}
