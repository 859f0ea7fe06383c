//! Error Types
//!
//! Errors surfaced by [`AdaptiveSocket`](crate::AdaptiveSocket) and the
//! classification used by the transport switch.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::state::ConnectionState;

/// Errors that can occur while connecting or writing
#[derive(Debug, Error)]
pub enum SocketError {
    /// Pre-flight existence check on the endpoint path failed
    #[error("Endpoint {path:?} not found: {source}")]
    EndpointNotFound {
        /// The endpoint that was probed
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: io::Error,
    },

    /// The endpoint rejected both stream and datagram transports
    #[error("Endpoint {path:?} rejected both stream and datagram transports: {source}")]
    WrongTransportType {
        /// The endpoint that rejected the connection
        path: PathBuf,
        /// The second wrong-type error
        #[source]
        source: io::Error,
    },

    /// Connection to the endpoint failed
    #[error("Connection to {path:?} failed: {source}")]
    ConnectionFailed {
        /// The endpoint that was dialed
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: io::Error,
    },

    /// `connect` was called while a connection exists or is in progress
    #[error("Connect called while {0}")]
    InvalidState(ConnectionState),

    /// No endpoint path given to `connect` nor at construction
    #[error("No endpoint path configured")]
    MissingPath,

    /// A write was submitted before the previous one completed
    #[error("A write is already in progress")]
    WriteInProgress,

    /// A write was submitted after `end` or `destroy`
    #[error("Write after end")]
    WriteAfterEnd,

    /// The socket was destroyed before the operation completed
    #[error("Socket destroyed")]
    Destroyed,

    /// The socket closed before the operation completed
    #[error("Socket closed")]
    Closed,

    /// IO error from the connected transport
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Check whether a connect error means the remote socket is of the other kind
///
/// Connecting a `SOCK_STREAM` socket to a path bound by a `SOCK_DGRAM` socket
/// (or the reverse) fails with `EPROTOTYPE` ("protocol wrong type for
/// socket", 91 on Linux).
#[must_use]
pub fn is_wrong_transport_type(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EPROTOTYPE)
}
