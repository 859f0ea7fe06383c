//! Transport Layer
//!
//! The two socket primitives the adaptive socket drives, expressed as
//! collaborator contracts:
//! - [`StreamTransport`]: connection-oriented `SOCK_STREAM`
//! - [`DatagramTransport`]: connectionless `SOCK_DGRAM` with congestion signals
//!
//! # Signals
//!
//! Transport operations never block and never return results directly.
//! Every outcome is reported as a [`TransportEvent`] through the
//! [`SignalSender`] the handle was created with. Each handle gets its own
//! [`HandleId`], so once the socket drops a handle every later signal from it
//! is recognised as stale and ignored.
//!
//! ```text
//! ┌────────────────┐  connect/write/end/close   ┌──────────────────┐
//! │ AdaptiveSocket ├───────────────────────────►│ Stream/Datagram  │
//! │    (driver)    │◄───────────────────────────┤    transport     │
//! └────────────────┘   TransportSignal(id, ev)  └──────────────────┘
//! ```

pub mod unix;

use std::fmt;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::TransportKind;

pub use unix::{UnixDatagramTransport, UnixStreamTransport, UnixTransportFactory};

/// Identifies one opened transport handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Something a transport reports back to its owner
#[derive(Debug)]
pub enum TransportEvent {
    /// Connection established
    Connect,
    /// Connect failure, or a read-side failure after connecting
    Error(io::Error),
    /// The transport closed on its own (peer hangup, stream end completed)
    Close,
    /// The last `write`/`send` was acknowledged or failed
    Sent(io::Result<()>),
    /// Datagram send buffer full; the payload was not sent
    Congestion,
    /// Datagram socket writable again after congestion
    Writable,
    /// Stream half-close completed
    Finished,
}

/// A [`TransportEvent`] tagged with the handle that produced it
#[derive(Debug)]
pub struct TransportSignal {
    /// Producing handle
    pub handle: HandleId,
    /// What happened
    pub event: TransportEvent,
}

/// Sending half of the signal channel, bound to one handle
#[derive(Clone, Debug)]
pub struct SignalSender {
    handle: HandleId,
    tx: mpsc::UnboundedSender<TransportSignal>,
}

impl SignalSender {
    /// Bind a sender to `handle`
    #[must_use]
    pub fn new(handle: HandleId, tx: mpsc::UnboundedSender<TransportSignal>) -> Self {
        Self { handle, tx }
    }

    /// The handle this sender reports for
    #[must_use]
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Report an event
    ///
    /// Silently dropped when the owning socket is gone.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(TransportSignal {
            handle: self.handle,
            event,
        });
    }
}

/// Connection-oriented transport contract
///
/// Emits `Connect`, `Error`, `Close`, `Sent` and `Finished`.
pub trait StreamTransport: Send {
    /// Start connecting to `path`
    fn connect(&mut self, path: &Path);

    /// Write the whole payload; completion arrives as `Sent`
    fn write(&mut self, payload: Bytes);

    /// Graceful half-close; `Finished` then `Close` follow
    fn end(&mut self);
}

/// Connectionless transport contract
///
/// Emits `Connect`, `Error`, `Sent`, `Congestion` and `Writable`. It never
/// emits `Close`; the owner synthesizes one after calling [`close`].
///
/// [`close`]: DatagramTransport::close
pub trait DatagramTransport: Send {
    /// Connect the socket to `path`
    fn connect(&mut self, path: &Path);

    /// Send the payload as one datagram
    fn send(&mut self, payload: Bytes);

    /// Release the socket without signalling
    fn close(&mut self);
}

/// An opened handle of either kind
pub enum TransportHandle {
    /// `SOCK_STREAM` handle
    Stream(Box<dyn StreamTransport>),
    /// `SOCK_DGRAM` handle
    Datagram(Box<dyn DatagramTransport>),
}

impl TransportHandle {
    /// Which kind this handle is
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stream(_) => TransportKind::Stream,
            Self::Datagram(_) => TransportKind::Datagram,
        }
    }

    /// Start connecting to `path`
    pub fn connect(&mut self, path: &Path) {
        match self {
            Self::Stream(stream) => stream.connect(path),
            Self::Datagram(datagram) => datagram.connect(path),
        }
    }

    /// Stream write or datagram send
    pub fn send(&mut self, payload: Bytes) {
        match self {
            Self::Stream(stream) => stream.write(payload),
            Self::Datagram(datagram) => datagram.send(payload),
        }
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransportHandle").field(&self.kind()).finish()
    }
}

/// Builds transport handles and checks endpoints
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    /// Create an unconnected handle of `kind`
    fn open(&self, kind: TransportKind, signals: SignalSender) -> TransportHandle;

    /// Check that the endpoint exists before connecting
    async fn probe(&self, path: &Path) -> io::Result<()> {
        tokio::fs::metadata(path).await.map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod fake;
