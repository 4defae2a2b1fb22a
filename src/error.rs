//! Error types for StreamGoo.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for StreamGoo operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for StreamGoo.
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("output sink unavailable: {0}")]
    SinkUnavailable(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Recording errors
    #[error("recording error: {0}")]
    Record(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Transport layer errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bind failed on {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    #[error("failed to join multicast group {group}: {reason}")]
    JoinFailed { group: String, reason: String },

    #[error("connect to {addr} failed: {reason}")]
    ConnectFailed { addr: SocketAddr, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("socket error: {0}")]
    SocketError(String),
}

/// Process exit status reported to the operator's shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Operator-initiated shutdown.
    Clean,
    /// Arguments or configuration could not be parsed or validated.
    InvalidArguments,
    /// The forwarding destination could not be opened.
    NullOutputWriter,
    /// Anything else that escaped the relay loop.
    UnknownError,
}

impl ExitStatus {
    /// Numeric process exit code.
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::InvalidArguments => 2,
            ExitStatus::NullOutputWriter => 100,
            ExitStatus::UnknownError => 200,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Clean => write!(f, "clean shutdown"),
            ExitStatus::InvalidArguments => write!(f, "invalid arguments"),
            ExitStatus::NullOutputWriter => write!(f, "output sink unavailable"),
            ExitStatus::UnknownError => write!(f, "unhandled error"),
        }
    }
}

impl Error {
    /// Map an error to the exit status the process should terminate with.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => ExitStatus::InvalidArguments,
            Error::SinkUnavailable(_) => ExitStatus::NullOutputWriter,
            _ => ExitStatus::UnknownError,
        }
    }

    /// Check if error is fatal only because of operator input.
    pub fn is_config_error(&self) -> bool {
        self.exit_status() == ExitStatus::InvalidArguments
    }
}
