//! Adaptive Socket
//!
//! A writable Unix socket that works against both stream and datagram
//! endpoints. It connects with the configured [`TransportKind`]; if the
//! endpoint turns out to be the other kind (`EPROTOTYPE` on connect) it
//! reopens with the other kind, once per connection attempt.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   Command    ┌──────────────────────────────┐
//! │  AdaptiveSocket  ├─────────────►│            Driver            │
//! │     (handle)     │              │  state · WriteSlot · switch  │
//! │                  │◄── events ───┤                              │
//! └────────┬─────────┘  (broadcast) └──────┬───────────────▲───────┘
//!          │ Shared (state mirror)         │ connect/send  │ TransportSignal
//!          └───────────────────────────────┤               │
//!                                   ┌──────▼───────────────┴───────┐
//!                                   │  Stream / Datagram transport │
//!                                   └──────────────────────────────┘
//! ```
//!
//! The driver is the only owner of the transport and processes commands and
//! transport signals one at a time, so no state is ever mutated concurrently.
//!
//! # Example
//!
//! ```no_run
//! use unixsock_core::{AdaptiveSocket, ConnectOptions};
//!
//! # async fn demo() -> Result<(), unixsock_core::SocketError> {
//! let socket = AdaptiveSocket::new();
//! socket
//!     .connect(("/dev/log", ConnectOptions::new().datagram()))?
//!     .await?;
//! socket.write("<14>hello")?.await?;
//! socket.end().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::{
    ConnectOptions, ConnectTarget, SocketConfig, TransportKind, DEFAULT_EVENT_CAPACITY,
};
use crate::error::{is_wrong_transport_type, SocketError};
use crate::state::{ConnectionState, Shared, WriteCompletion, WriteSlot};
use crate::transport::{
    HandleId, SignalSender, TransportEvent, TransportFactory, TransportHandle, TransportSignal,
    UnixTransportFactory,
};
use crate::writer::{Completion, MessageWriter, PendingConnect, PendingEnd, PendingWrite};

/// Notifications for observers of an [`AdaptiveSocket`]
#[derive(Clone, Debug)]
pub enum SocketEvent {
    /// Connected, and nobody awaited the `PendingConnect`
    Connect,
    /// Connect failure nobody awaited, or a post-connect transport error
    Error(Arc<SocketError>),
    /// The connection closed; at most once per connection attempt
    Close,
    /// A backpressured write went out; the writer accepts a new message
    Drain,
}

type Reply = oneshot::Sender<Result<(), SocketError>>;

enum Command {
    Connect {
        path: PathBuf,
        kind: TransportKind,
        reply: Reply,
    },
    Write {
        payload: Bytes,
        done: WriteCompletion,
        backpressured: bool,
    },
    End {
        done: Reply,
    },
    Destroy,
}

/// Writable socket over a Unix stream or datagram endpoint
///
/// Must be created inside a Tokio runtime: construction spawns the driver
/// task. Dropping the socket stops the driver and releases the transport
/// without emitting further events.
pub struct AdaptiveSocket {
    shared: Arc<Mutex<Shared>>,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SocketEvent>,
    defaults: ConnectOptions,
}

impl AdaptiveSocket {
    /// Create a socket with no default endpoint
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ConnectOptions::default())
    }

    /// Create a socket whose `connect(())` uses `options`
    #[must_use]
    pub fn with_options(options: ConnectOptions) -> Self {
        Self::with_factory(options, UnixTransportFactory)
    }

    /// Create a socket from a loaded configuration
    #[must_use]
    pub fn from_config(config: &SocketConfig) -> Self {
        Self::build(
            config.options.clone(),
            config.event_capacity,
            UnixTransportFactory,
        )
    }

    /// Create a socket with a custom transport factory
    #[must_use]
    pub fn with_factory<F: TransportFactory>(options: ConnectOptions, factory: F) -> Self {
        Self::build(options, DEFAULT_EVENT_CAPACITY, factory)
    }

    fn build<F: TransportFactory>(
        options: ConnectOptions,
        event_capacity: usize,
        factory: F,
    ) -> Self {
        let shared = Arc::new(Mutex::new(Shared::new(
            options.kind.unwrap_or_default(),
            options.path.clone(),
        )));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(event_capacity.max(1));

        let driver = Driver::new(factory, Arc::clone(&shared), events.clone(), commands_rx);
        tokio::spawn(driver.run());

        Self {
            shared,
            commands: commands_tx,
            events,
            defaults: options,
        }
    }

    /// Start a connection attempt
    ///
    /// Accepts a path, a [`ConnectOptions`], a `(path, options)` pair, or `()`
    /// to use the options given at construction. Await the returned future
    /// for the outcome, or drop it and watch for `Connect`/`Error` events.
    ///
    /// # Errors
    ///
    /// - `SocketError::InvalidState` if a connection exists, is in progress,
    ///   or the socket was destroyed
    /// - `SocketError::MissingPath` if no endpoint path is known
    pub fn connect(&self, target: impl Into<ConnectTarget>) -> Result<PendingConnect, SocketError> {
        let (path, kind) = {
            let mut shared = self.shared.lock();
            if shared.state != ConnectionState::Disconnected {
                return Err(SocketError::InvalidState(shared.state));
            }
            let (path, kind) = target.into().resolve(&self.defaults)?;
            shared.state = ConnectionState::Connecting;
            shared.kind = kind;
            shared.path = Some(path.clone());
            shared.ended = false;
            (path, kind)
        };

        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Connect { path, kind, reply });
        Ok(Completion::new(rx))
    }

    /// Submit one message
    ///
    /// Sent immediately when connected and not congested, held otherwise.
    /// The slot is released before the returned future resolves, so the next
    /// write can be issued right after awaiting this one.
    ///
    /// # Errors
    ///
    /// - `SocketError::WriteInProgress` if the previous write is outstanding
    /// - `SocketError::WriteAfterEnd` after `end`
    /// - `SocketError::Destroyed` after `destroy`
    pub fn write(&self, payload: impl Into<Bytes>) -> Result<PendingWrite, SocketError> {
        let backpressured = {
            let mut shared = self.shared.lock();
            if shared.state == ConnectionState::Destroyed {
                return Err(SocketError::Destroyed);
            }
            if shared.ended {
                return Err(SocketError::WriteAfterEnd);
            }
            if shared.write_outstanding {
                return Err(SocketError::WriteInProgress);
            }
            shared.write_outstanding = true;
            shared.state != ConnectionState::Connected || shared.congested
        };

        let (done, rx) = oneshot::channel();
        self.send_command(Command::Write {
            payload: payload.into(),
            done,
            backpressured,
        });
        Ok(PendingWrite::new(rx, backpressured))
    }

    /// Flush the outstanding write, then close the transport
    ///
    /// Datagram sockets close immediately and emit `Close`. Stream sockets
    /// half-close; the future resolves once the shutdown is flushed and
    /// `Close` follows when the transport finishes closing.
    pub fn end(&self) -> PendingEnd {
        self.shared.lock().ended = true;

        let (done, rx) = oneshot::channel();
        self.send_command(Command::End { done });
        Completion::new(rx)
    }

    /// Close for good; the socket cannot be reused
    ///
    /// A write already accepted on a connected transport is still flushed
    /// before the transport closes, as with `end`. Without a connected
    /// transport the held write fails with `SocketError::Destroyed`.
    pub fn destroy(&self) {
        {
            let mut shared = self.shared.lock();
            shared.state = ConnectionState::Destroyed;
            shared.ended = true;
        }
        self.send_command(Command::Destroy);
    }

    /// Subscribe to socket events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.events.subscribe()
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Transport kind in use (or to be tried first)
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.shared.lock().kind
    }

    /// Whether the datagram transport is backed up
    #[must_use]
    pub fn is_congested(&self) -> bool {
        self.shared.lock().congested
    }

    /// Endpoint path of the current (or default) connection
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.shared.lock().path.clone()
    }

    fn send_command(&self, command: Command) {
        // A gone driver drops the reply, which resolves as Closed
        let _ = self.commands.send(command);
    }
}

impl Default for AdaptiveSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdaptiveSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("AdaptiveSocket")
            .field("state", &shared.state)
            .field("kind", &shared.kind)
            .field("path", &shared.path)
            .finish_non_exhaustive()
    }
}

impl MessageWriter for AdaptiveSocket {
    fn write(&self, payload: Bytes) -> Result<PendingWrite, SocketError> {
        AdaptiveSocket::write(self, payload)
    }

    fn end(&self) -> PendingEnd {
        AdaptiveSocket::end(self)
    }
}

// =============================================================================
// Driver
// =============================================================================

struct ActiveTransport {
    id: HandleId,
    handle: TransportHandle,
    connected: bool,
    /// Stream half-close already requested
    ending: bool,
}

struct Driver<F> {
    factory: F,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<SocketEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    signals_tx: mpsc::UnboundedSender<TransportSignal>,
    signals_rx: mpsc::UnboundedReceiver<TransportSignal>,
    next_handle: u64,

    path: Option<PathBuf>,
    kind: TransportKind,
    switched: bool,
    transport: Option<ActiveTransport>,
    connect_reply: Option<Reply>,
    slot: WriteSlot,
    /// `end` requests waiting for the slot to drain
    end_requests: Vec<Reply>,
    /// `end` requests waiting for the transport to finish closing
    finishing: Vec<Reply>,
    /// `destroy` waiting for the slot to drain
    draining: bool,
}

impl<F: TransportFactory> Driver<F> {
    fn new(
        factory: F,
        shared: Arc<Mutex<Shared>>,
        events: broadcast::Sender<SocketEvent>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let kind = shared.lock().kind;
        Self {
            factory,
            shared,
            events,
            commands,
            signals_tx,
            signals_rx,
            next_handle: 0,
            path: None,
            kind,
            switched: false,
            transport: None,
            connect_reply: None,
            slot: WriteSlot::new(),
            end_requests: Vec::new(),
            finishing: Vec::new(),
            draining: false,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(signal) = self.signals_rx.recv() => self.on_signal(signal),
            }
        }

        // Handle dropped: release the transport without signalling anyone
        if let Some(mut active) = self.transport.take() {
            if let TransportHandle::Datagram(datagram) = &mut active.handle {
                datagram.close();
            }
        }
        tracing::debug!(path = ?self.path, "Socket driver stopped");
    }

    fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    fn publish(&self, event: SocketEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { path, kind, reply } => self.connect(path, kind, reply).await,
            Command::Write {
                payload,
                done,
                backpressured,
            } => {
                tracing::debug!(bytes = payload.len(), backpressured, "Write accepted");
                self.slot.hold(payload, done, backpressured);
                self.flush();

                // Accepted just before destroy with nothing left to send it
                if self.state() == ConnectionState::Destroyed && !self.can_send() {
                    self.fail_held(SocketError::Destroyed);
                }
            }
            Command::End { done } => {
                self.end_requests.push(done);
                self.try_finish_end();
            }
            Command::Destroy => self.destroy(),
        }
    }

    async fn connect(&mut self, path: PathBuf, kind: TransportKind, reply: Reply) {
        self.kind = kind;
        self.switched = false;
        self.connect_reply = Some(reply);
        self.path = Some(path.clone());

        tracing::info!(path = ?path, kind = %kind, "Connecting");

        if let Err(source) = self.factory.probe(&path).await {
            tracing::warn!(path = ?path, error = %source, "Endpoint not found");
            self.fail_connect(SocketError::EndpointNotFound { path, source });
            return;
        }

        // destroy() raced the probe; the queued Destroy command cleans up
        if self.state() != ConnectionState::Connecting {
            return;
        }

        self.open_transport();
    }

    fn destroy(&mut self) {
        {
            let mut shared = self.shared.lock();
            shared.state = ConnectionState::Destroyed;
            shared.ended = true;
        }

        if let Some(reply) = self.connect_reply.take() {
            let _ = reply.send(Err(SocketError::Destroyed));
        }
        if !self.can_send() {
            self.fail_held(SocketError::Destroyed);
        }

        self.draining = true;
        self.try_finish_end();
    }

    // -------------------------------------------------------------------------
    // Transport lifecycle
    // -------------------------------------------------------------------------

    fn open_transport(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };

        self.next_handle += 1;
        let id = HandleId(self.next_handle);
        let signals = SignalSender::new(id, self.signals_tx.clone());

        let mut handle = self.factory.open(self.kind, signals);
        handle.connect(&path);
        self.shared.lock().kind = self.kind;

        tracing::debug!(handle = %id, kind = %self.kind, "Transport opened");
        self.transport = Some(ActiveTransport {
            id,
            handle,
            connected: false,
            ending: false,
        });
    }

    fn switch_transport(&mut self) {
        if let Some(mut failed) = self.transport.take() {
            // Only datagram handles are closeable; the stream task is aborted on drop
            if let TransportHandle::Datagram(datagram) = &mut failed.handle {
                datagram.close();
            }
        }

        let from = self.kind;
        self.kind = from.other();
        self.switched = true;

        tracing::info!(
            path = ?self.path,
            from = %from,
            to = %self.kind,
            "Endpoint is the other socket type, switching transport"
        );
        self.open_transport();
    }

    fn close_transport(&mut self) {
        let synthesize_close = match self.transport.as_mut() {
            None => false,
            Some(active) => match &mut active.handle {
                TransportHandle::Stream(stream) if active.connected => {
                    if !active.ending {
                        active.ending = true;
                        stream.end();
                    }
                    false
                }
                // Never connected: nothing to half-close
                TransportHandle::Stream(_) => true,
                // Datagram handles never report Close themselves
                TransportHandle::Datagram(datagram) => {
                    datagram.close();
                    true
                }
            },
        };

        if self.transport.is_none() {
            self.resolve_finishing();
        } else if synthesize_close {
            self.on_close();
        }
    }

    /// Send the held write if the transport can take it
    fn flush(&mut self) {
        // Destroyed with a live transport means draining the last write
        if !matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Destroyed
        ) {
            return;
        }
        let Some(active) = self.transport.as_mut() else {
            return;
        };
        if !active.connected || active.ending {
            return;
        }
        let Some(payload) = self.slot.next_send() else {
            return;
        };

        tracing::debug!(bytes = payload.len(), kind = %active.handle.kind(), "Sending");
        active.handle.send(payload);
    }

    /// Run the close path for pending `end`/`destroy` once nothing is left to flush
    fn try_finish_end(&mut self) {
        if self.end_requests.is_empty() && !self.draining {
            return;
        }

        let state = self.state();
        if state == ConnectionState::Connecting {
            return;
        }
        if !self.slot.is_empty() && self.can_send() {
            return;
        }

        self.fail_held(if state == ConnectionState::Destroyed {
            SocketError::Destroyed
        } else {
            SocketError::Closed
        });

        self.draining = false;
        let requests = std::mem::take(&mut self.end_requests);
        self.finishing.extend(requests);
        self.close_transport();
    }

    /// A connected transport that still accepts writes
    fn can_send(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|active| active.connected && !active.ending)
    }

    fn fail_held(&mut self, error: SocketError) {
        if let Some(message) = self.slot.take() {
            self.release_write();
            message.finish(Err(error));
        }
    }

    fn resolve_finishing(&mut self) {
        for reply in self.finishing.drain(..) {
            let _ = reply.send(Ok(()));
        }
    }

    fn release_write(&self) {
        self.shared.lock().write_outstanding = false;
    }

    // -------------------------------------------------------------------------
    // Signals
    // -------------------------------------------------------------------------

    fn on_signal(&mut self, signal: TransportSignal) {
        if self.transport.as_ref().map(|active| active.id) != Some(signal.handle) {
            tracing::trace!(handle = %signal.handle, "Ignoring signal from released transport");
            return;
        }

        match signal.event {
            TransportEvent::Connect => self.on_connect(),
            TransportEvent::Error(error) => self.on_error(error),
            TransportEvent::Close => self.on_close(),
            TransportEvent::Sent(result) => self.on_sent(result),
            TransportEvent::Congestion => self.on_congestion(),
            TransportEvent::Writable => self.on_writable(),
            TransportEvent::Finished => self.resolve_finishing(),
        }
    }

    fn on_connect(&mut self) {
        {
            let mut shared = self.shared.lock();
            if shared.state == ConnectionState::Destroyed {
                return;
            }
            shared.state = ConnectionState::Connected;
        }
        if let Some(active) = self.transport.as_mut() {
            active.connected = true;
        }

        tracing::info!(
            path = ?self.path,
            kind = %self.kind,
            switched = self.switched,
            "Connected"
        );

        self.settle_connect(Ok(()));
        self.flush();
        self.try_finish_end();
    }

    fn on_error(&mut self, error: io::Error) {
        let connected = self.transport.as_ref().is_some_and(|active| active.connected);

        match self.state() {
            ConnectionState::Connecting if !connected => {
                if is_wrong_transport_type(&error) && !self.switched {
                    self.switch_transport();
                    return;
                }

                let path = self.path.clone().unwrap_or_default();
                let failure = if is_wrong_transport_type(&error) {
                    SocketError::WrongTransportType {
                        path,
                        source: error,
                    }
                } else {
                    SocketError::ConnectionFailed {
                        path,
                        source: error,
                    }
                };
                tracing::warn!(error = %failure, "Connection attempt failed");
                self.fail_connect(failure);
            }
            ConnectionState::Destroyed => {
                tracing::debug!(error = %error, "Transport error after destroy");
            }
            _ => {
                tracing::warn!(error = %error, "Transport error");
                self.publish(SocketEvent::Error(Arc::new(SocketError::Io(error))));
            }
        }
    }

    fn on_close(&mut self) {
        if self.transport.take().is_none() {
            return;
        }

        self.slot.set_congested(false);
        {
            let mut shared = self.shared.lock();
            if shared.state != ConnectionState::Destroyed {
                shared.state = ConnectionState::Disconnected;
            }
            shared.congested = false;
        }

        if self.slot.is_in_flight() {
            if let Some(message) = self.slot.take() {
                self.release_write();
                message.finish(Err(SocketError::Closed));
            }
        }
        if let Some(reply) = self.connect_reply.take() {
            let _ = reply.send(Err(SocketError::Closed));
        }

        tracing::info!(path = ?self.path, kind = %self.kind, "Socket closed");
        self.publish(SocketEvent::Close);
        self.resolve_finishing();

        // end() issued while this connection was still draining
        self.try_finish_end();
    }

    fn on_sent(&mut self, result: io::Result<()>) {
        let Some(message) = self.slot.complete() else {
            return;
        };
        self.release_write();

        match result {
            Ok(()) => {
                tracing::debug!(bytes = message.payload.len(), "Write acknowledged");
                let backpressured = message.backpressured;
                message.finish(Ok(()));
                if backpressured {
                    self.publish(SocketEvent::Drain);
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "Write failed");
                let event = SocketEvent::Error(Arc::new(SocketError::Io(duplicate(&error))));
                message.finish(Err(SocketError::Io(error)));
                self.publish(event);
            }
        }

        self.try_finish_end();
    }

    fn on_congestion(&mut self) {
        tracing::debug!(path = ?self.path, "Datagram transport congested");
        self.slot.set_congested(true);
        self.slot.requeue();
        self.shared.lock().congested = true;
    }

    fn on_writable(&mut self) {
        tracing::debug!(path = ?self.path, "Datagram transport writable");
        self.slot.set_congested(false);
        self.shared.lock().congested = false;
        self.flush();
    }

    // -------------------------------------------------------------------------
    // Outcomes
    // -------------------------------------------------------------------------

    /// Report the connect outcome to the awaiting caller, or as an event
    fn settle_connect(&mut self, result: Result<(), SocketError>) {
        let unclaimed = match self.connect_reply.take() {
            Some(reply) => reply.send(result).err(),
            None => Some(result),
        };

        match unclaimed {
            Some(Ok(())) => self.publish(SocketEvent::Connect),
            Some(Err(error)) => self.publish(SocketEvent::Error(Arc::new(error))),
            None => {}
        }
    }

    fn fail_connect(&mut self, error: SocketError) {
        // Observers of the outcome already see the terminal state
        self.shared.lock().state = ConnectionState::Destroyed;
        self.settle_connect(Err(error));
        self.destroy();
    }
}

/// Copy an IO error for the second recipient, keeping the errno when present
fn duplicate(error: &io::Error) -> io::Error {
    match error.raw_os_error() {
        Some(code) => io::Error::from_raw_os_error(code),
        None => io::Error::new(error.kind(), error.to_string()),
    }
}
