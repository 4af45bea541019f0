use std::io;
use std::time::Duration;
use thiserror::Error;

/// Broad category of an [`SshError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Establishing or authenticating the session failed.
    Connection,
    /// Running one command failed.
    Execution,
    /// The service was used in a state that does not allow the call.
    State,
}

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Failed to connect to {host}:{port}: {message}")]
    Connection {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Connection to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("Authentication failed for {username}")]
    AuthenticationFailed { username: String },

    #[error("Host key for {host}:{port} was rejected")]
    HostKeyRejected { host: String, port: u16 },

    #[error("Either a password or a private key file must be supplied")]
    MissingCredentials,

    #[error("Failed to execute '{command}': {message}")]
    Execution { command: String, message: String },

    #[error("Failed to read output of '{command}': {source}")]
    Read {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Interrupted while waiting for '{command}'")]
    Interrupted { command: String },

    #[error("Command '{command}' did not finish within {timeout:?}")]
    ExecutionTimeout { command: String, timeout: Duration },

    #[error("SSH session not ready to execute commands")]
    NotConnected,

    #[error("Background worker is no longer running")]
    WorkerStopped,

    #[error("Result not ready after {0:?}")]
    WaitTimeout(Duration),
}

impl SshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SshError::Connection { .. }
            | SshError::ConnectTimeout { .. }
            | SshError::AuthenticationFailed { .. }
            | SshError::HostKeyRejected { .. }
            | SshError::MissingCredentials => ErrorKind::Connection,
            SshError::Execution { .. }
            | SshError::Read { .. }
            | SshError::Interrupted { .. }
            | SshError::ExecutionTimeout { .. } => ErrorKind::Execution,
            SshError::NotConnected | SshError::WorkerStopped | SshError::WaitTimeout(_) => {
                ErrorKind::State
            }
        }
    }

    pub(crate) fn execution(command: &str, message: impl std::fmt::Display) -> Self {
        SshError::Execution {
            command: command.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SshError>;
