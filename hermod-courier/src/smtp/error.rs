use std::io;

use thiserror::Error;

/// Transport failures talking to a remote server
///
/// Unexpected reply codes are not errors at this level; the caller decides
/// what a reply means.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse SMTP response: {0}")]
    Parse(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// No reply within the command timeout; names what we were waiting on.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, ClientError>;
