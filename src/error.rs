use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that may occur while bridging the device and the network.
#[derive(Debug, Error, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum Error {
    /// The serial device could not be opened.
    /// Not found, access denied, or the open was aborted.
    #[error("The device could not be opened: {0}")]
    DeviceUnavailable(String),

    /// Reading from or writing to the opened device failed.
    /// The device is a single shared resource, so this cannot be
    /// recovered in place: the whole session layer goes down with it.
    #[error("Device I/O failed: {0}")]
    DeviceIo(String),

    /// The listener could not be bound.
    #[error("Could not bind listener: {0}")]
    Bind(String),

    /// The peer ended the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Reading from or writing to the active connection failed for a
    /// reason other than a graceful close, deadline overruns included.
    #[error("Connection I/O failed: {0}")]
    ConnectionIo(String),

    /// An accept attempt on the listener failed.
    #[error("Could not accept connection: {0}")]
    Accept(String),
}

impl Error {
    /// A graceful end-of-stream, as opposed to an I/O fault.
    /// Both are handled the same way; they are just logged differently.
    pub fn is_graceful_close(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_peer_closes_are_graceful() {
        assert!(Error::ConnectionClosed.is_graceful_close());

        assert!(!Error::ConnectionIo("read timed out".into()).is_graceful_close());
        assert!(!Error::DeviceIo("end of stream".into()).is_graceful_close());
    }
}
