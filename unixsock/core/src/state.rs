//! Socket State
//!
//! Connection state, the single-slot write queue and the state mirror shared
//! between the [`AdaptiveSocket`](crate::AdaptiveSocket) handle and its driver.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::config::TransportKind;
use crate::error::SocketError;

/// Lifecycle state of an adaptive socket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection; `connect` is allowed
    #[default]
    Disconnected,
    /// Pre-flight check or transport connect in progress
    Connecting,
    /// Transport connected; writes are sent immediately
    Connected,
    /// Terminal; the socket cannot be reused
    Destroyed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Completion channel for a single write
pub(crate) type WriteCompletion = oneshot::Sender<Result<(), SocketError>>;

/// A write accepted by the socket but not yet acknowledged by the transport
#[derive(Debug)]
pub(crate) struct PendingMessage {
    pub payload: Bytes,
    pub done: WriteCompletion,
    /// Handed to the transport, waiting for `Sent`
    pub in_flight: bool,
    /// The write was held when accepted; a `Drain` event follows completion
    pub backpressured: bool,
}

impl PendingMessage {
    /// Resolve the caller's write future
    pub fn finish(self, result: Result<(), SocketError>) {
        // Caller may have dropped the future
        let _ = self.done.send(result);
    }
}

/// Single-slot write queue plus the datagram congestion flag
///
/// Every send attempt goes through [`WriteSlot::next_send`], which refuses to
/// hand out a payload while congested or while one is already in flight.
#[derive(Debug, Default)]
pub(crate) struct WriteSlot {
    pending: Option<PendingMessage>,
    congested: bool,
}

impl WriteSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a payload until it can be sent
    ///
    /// The handle enforces one outstanding write, so an occupied slot here
    /// means the caller raced the contract; the newcomer is rejected.
    pub fn hold(&mut self, payload: Bytes, done: WriteCompletion, backpressured: bool) {
        if self.pending.is_some() {
            let _ = done.send(Err(SocketError::WriteInProgress));
            return;
        }
        self.pending = Some(PendingMessage {
            payload,
            done,
            in_flight: false,
            backpressured,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| p.in_flight)
    }

    pub fn set_congested(&mut self, congested: bool) {
        self.congested = congested;
    }

    /// Payload to hand to the transport, if one is held and sending is allowed
    pub fn next_send(&mut self) -> Option<Bytes> {
        if self.congested {
            return None;
        }
        let pending = self.pending.as_mut()?;
        if pending.in_flight {
            return None;
        }
        pending.in_flight = true;
        Some(pending.payload.clone())
    }

    /// The transport bounced the in-flight send (congestion); hold it again
    pub fn requeue(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.in_flight = false;
        }
    }

    /// Take the in-flight message once the transport acknowledged it
    pub fn complete(&mut self) -> Option<PendingMessage> {
        if self.is_in_flight() {
            self.pending.take()
        } else {
            None
        }
    }

    /// Take whatever is pending, sent or not
    pub fn take(&mut self) -> Option<PendingMessage> {
        self.pending.take()
    }
}

/// State mirrored for the handle: synchronous faults and introspection
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: ConnectionState,
    pub kind: TransportKind,
    pub path: Option<PathBuf>,
    pub congested: bool,
    pub write_outstanding: bool,
    pub ended: bool,
}

impl Shared {
    pub fn new(kind: TransportKind, path: Option<PathBuf>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            kind,
            path,
            congested: false,
            write_outstanding: false,
            ended: false,
        }
    }
}
