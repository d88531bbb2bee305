//! Error taxonomy for the FastDFS client.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FastDfsError>;

/// Errors that can occur while talking to a FastDFS cluster.
#[derive(Error, Debug)]
pub enum FastDfsError {
    /// The client configuration file is missing, malformed, or lacks a required key.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A TCP connect, send, or recv failed, timed out, or the pool was exhausted.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// A response's header decoded, but its body violated the protocol's length or
    /// record-size expectations.
    #[error("response error: {0}")]
    ResponseError(String),

    /// Caller input was invalid, or the server returned a non-zero status on a
    /// data-plane command.
    #[error("data error: {0}")]
    DataError(String),

    /// A response decoded structurally but violated a semantic constraint.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps a FastDFS protocol status byte (a POSIX errno) to an error, or `None` on success.
///
/// The text is rendered via the host OS's errno table so the message matches what
/// `strerror(3)` would report for that code.
pub fn status_to_error(status: u8) -> Option<FastDfsError> {
    if status == 0 {
        return None;
    }
    let os_err = std::io::Error::from_raw_os_error(status as i32);
    Some(FastDfsError::DataError(format!(
        "server returned status {}: {}",
        status, os_err
    )))
}
