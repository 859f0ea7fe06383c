//! Tokio Unix Socket Transports
//!
//! [`StreamTransport`] and [`DatagramTransport`] implementations over
//! `tokio::net::UnixStream` and `tokio::net::UnixDatagram`.
//!
//! The stream handle runs one task per connection that owns the socket:
//! writes and the half-close are fed to it over a channel, and it keeps
//! reading so a peer hangup surfaces as `Close`. The datagram handle sends
//! with `try_send`; a full send buffer is reported as `Congestion` and a
//! background wait on writability reports `Writable`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixDatagram, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{
    DatagramTransport, SignalSender, StreamTransport, TransportEvent, TransportFactory,
    TransportHandle,
};
use crate::config::TransportKind;

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is not connected")
}

// =============================================================================
// Stream
// =============================================================================

enum StreamOp {
    Write(Bytes),
    End,
}

/// `SOCK_STREAM` transport backed by a Tokio task
pub struct UnixStreamTransport {
    signals: SignalSender,
    ops: Option<mpsc::UnboundedSender<StreamOp>>,
    task: Option<JoinHandle<()>>,
}

impl UnixStreamTransport {
    /// Create an unconnected stream transport reporting through `signals`
    #[must_use]
    pub fn new(signals: SignalSender) -> Self {
        Self {
            signals,
            ops: None,
            task: None,
        }
    }

    fn submit(&self, op: StreamOp) -> bool {
        self.ops.as_ref().is_some_and(|ops| ops.send(op).is_ok())
    }
}

impl StreamTransport for UnixStreamTransport {
    fn connect(&mut self, path: &Path) {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        self.ops = Some(ops_tx);
        self.task = Some(tokio::spawn(run_stream(
            path.to_path_buf(),
            ops_rx,
            self.signals.clone(),
        )));
    }

    fn write(&mut self, payload: Bytes) {
        if !self.submit(StreamOp::Write(payload)) {
            self.signals.emit(TransportEvent::Sent(Err(not_connected())));
        }
    }

    fn end(&mut self) {
        if !self.submit(StreamOp::End) {
            // Connection task already gone; nothing left to flush
            self.signals.emit(TransportEvent::Finished);
            self.signals.emit(TransportEvent::Close);
        }
    }
}

impl Drop for UnixStreamTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_stream(
    path: PathBuf,
    mut ops: mpsc::UnboundedReceiver<StreamOp>,
    signals: SignalSender,
) {
    let stream = match UnixStream::connect(&path).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(path = ?path, error = %e, "Stream connect failed");
            signals.emit(TransportEvent::Error(e));
            return;
        }
    };
    signals.emit(TransportEvent::Connect);

    let (mut read_half, mut write_half) = stream.into_split();
    let mut buf = [0u8; 1024];
    let mut writing = true;

    loop {
        tokio::select! {
            op = ops.recv(), if writing => match op {
                Some(StreamOp::Write(payload)) => {
                    let result = write_half.write_all(&payload).await;
                    let failed = result.is_err();
                    signals.emit(TransportEvent::Sent(result));
                    if failed {
                        break;
                    }
                }
                Some(StreamOp::End) => {
                    writing = false;
                    match write_half.shutdown().await {
                        Ok(()) => signals.emit(TransportEvent::Finished),
                        Err(e) => {
                            signals.emit(TransportEvent::Error(e));
                            break;
                        }
                    }
                }
                // Owner dropped the handle
                None => return,
            },
            read = read_half.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!(path = ?path, "Stream closed by peer");
                    break;
                }
                // Inbound data is not part of the writer contract
                Ok(_) => {}
                Err(e) => {
                    signals.emit(TransportEvent::Error(e));
                    break;
                }
            },
        }
    }

    signals.emit(TransportEvent::Close);
}

// =============================================================================
// Datagram
// =============================================================================

/// `SOCK_DGRAM` transport with congestion signalling
pub struct UnixDatagramTransport {
    signals: SignalSender,
    socket: Option<Arc<UnixDatagram>>,
    waiter: Option<JoinHandle<()>>,
}

impl UnixDatagramTransport {
    /// Create an unconnected datagram transport reporting through `signals`
    #[must_use]
    pub fn new(signals: SignalSender) -> Self {
        Self {
            signals,
            socket: None,
            waiter: None,
        }
    }

    /// Wait for writability in the background, then emit `event`
    fn wait_writable(&mut self, socket: Arc<UnixDatagram>, event: fn() -> TransportEvent) {
        if let Some(waiter) = self.waiter.take() {
            waiter.abort();
        }
        let signals = self.signals.clone();
        self.waiter = Some(tokio::spawn(async move {
            match socket.writable().await {
                Ok(()) => signals.emit(event()),
                Err(e) => signals.emit(TransportEvent::Error(e)),
            }
        }));
    }
}

impl DatagramTransport for UnixDatagramTransport {
    fn connect(&mut self, path: &Path) {
        let result = UnixDatagram::unbound().and_then(|socket| {
            socket.connect(path)?;
            Ok(socket)
        });

        match result {
            Ok(socket) => {
                let socket = Arc::new(socket);
                self.socket = Some(Arc::clone(&socket));
                // Report the connection once the reactor has seen the socket writable
                self.wait_writable(socket, || TransportEvent::Connect);
            }
            Err(e) => {
                tracing::debug!(path = ?path, error = %e, "Datagram connect failed");
                self.signals.emit(TransportEvent::Error(e));
            }
        }
    }

    fn send(&mut self, payload: Bytes) {
        let Some(socket) = self.socket.clone() else {
            self.signals.emit(TransportEvent::Sent(Err(not_connected())));
            return;
        };

        match socket.try_send(&payload) {
            Ok(_) => self.signals.emit(TransportEvent::Sent(Ok(()))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.signals.emit(TransportEvent::Congestion);
                self.wait_writable(socket, || TransportEvent::Writable);
            }
            Err(e) => self.signals.emit(TransportEvent::Sent(Err(e))),
        }
    }

    fn close(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            waiter.abort();
        }
        self.socket = None;
    }
}

impl Drop for UnixDatagramTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds Tokio-backed Unix transports
#[derive(Clone, Copy, Debug, Default)]
pub struct UnixTransportFactory;

#[async_trait]
impl TransportFactory for UnixTransportFactory {
    fn open(&self, kind: TransportKind, signals: SignalSender) -> TransportHandle {
        match kind {
            TransportKind::Stream => {
                TransportHandle::Stream(Box::new(UnixStreamTransport::new(signals)))
            }
            TransportKind::Datagram => {
                TransportHandle::Datagram(Box::new(UnixDatagramTransport::new(signals)))
            }
        }
    }
}
