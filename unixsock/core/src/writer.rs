//! Writer Contract
//!
//! The writable side of a socket as an explicit trait, plus the futures that
//! carry completion of connects, writes and ends back to the caller.
//!
//! A writer accepts one message at a time. [`MessageWriter::write`] returns a
//! [`PendingWrite`]; when [`PendingWrite::backpressured`] is true the message
//! was held rather than sent, and a `Drain` event follows once it goes out.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::SocketError;

/// A message-oriented writer with single-outstanding-write semantics
pub trait MessageWriter {
    /// Submit one message
    ///
    /// # Errors
    ///
    /// Fails synchronously if a previous write has not completed, or the
    /// writer has been ended or destroyed.
    fn write(&self, payload: Bytes) -> Result<PendingWrite, SocketError>;

    /// Flush the outstanding message, then close
    fn end(&self) -> PendingEnd;
}

/// Resolves when an operation completes
///
/// If the driver goes away first it resolves to `SocketError::Closed`.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), SocketError>>,
}

impl Completion {
    pub(crate) fn new(rx: oneshot::Receiver<Result<(), SocketError>>) -> Self {
        Self { rx }
    }
}

impl Future for Completion {
    type Output = Result<(), SocketError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(SocketError::Closed)))
    }
}

/// Outcome of `connect`
///
/// Dropping it without awaiting routes the outcome to the `Connect` or
/// `Error` event instead.
pub type PendingConnect = Completion;

/// Outcome of `end`
pub type PendingEnd = Completion;

/// Outcome of a single write
#[derive(Debug)]
pub struct PendingWrite {
    completion: Completion,
    backpressured: bool,
}

impl PendingWrite {
    pub(crate) fn new(rx: oneshot::Receiver<Result<(), SocketError>>, backpressured: bool) -> Self {
        Self {
            completion: Completion::new(rx),
            backpressured,
        }
    }

    /// The message was held (not connected yet, or congested) when accepted
    #[must_use]
    pub fn backpressured(&self) -> bool {
        self.backpressured
    }
}

impl Future for PendingWrite {
    type Output = Result<(), SocketError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.completion).poll(cx)
    }
}
