mod socket;

pub use socket::SocketIo;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error connecting to {addr} ({code}): {message}")]
    Connect {
        addr: String,
        /// OS error code, `-1` when the failure did not come from the OS
        code: i32,
        message: String,
    },

    #[error("Error reading data. Received {received} instead of expected {expected} bytes")]
    ShortRead { received: usize, expected: usize },

    #[error("Error reading data after {received} of {expected} bytes: {source}")]
    Read {
        received: usize,
        expected: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Error sending data after {sent} of {total} bytes: {source}")]
    Write {
        sent: usize,
        total: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} timed out after {after:?} ({transferred} of {expected} bytes)")]
    TimedOut {
        operation: &'static str,
        transferred: usize,
        expected: usize,
        after: Duration,
    },

    #[error("Socket is closed")]
    Closed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TransportError {
    pub(crate) fn connect(addr: impl Into<String>, err: &std::io::Error) -> Self {
        TransportError::Connect {
            addr: addr.into(),
            code: err.raw_os_error().unwrap_or(-1),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
