//! Unixsock Core - Adaptive Writable Unix Sockets
//!
//! This crate provides a message-oriented writer over Unix domain sockets
//! that works whether the endpoint is a stream (`SOCK_STREAM`) or datagram
//! (`SOCK_DGRAM`) socket. The caller picks which kind to try first; if the
//! endpoint turns out to be the other kind, the socket switches transports
//! once and carries on, so a single client can talk to syslog-style datagram
//! sinks and stream daemons alike.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Caller                               │
//! │     connect() / write() / end() / destroy() / subscribe()    │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ Command
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                    ADAPTIVE SOCKET                           │
//! │  ┌───────────────────────────┴────────────────────────────┐  │
//! │  │                       Driver                           │  │
//! │  │  ┌────────────┐  ┌────────────┐  ┌──────────────────┐  │  │
//! │  │  │ Connection │  │ WriteSlot  │  │ Transport switch │  │  │
//! │  │  │   state    │  │ (1 message)│  │  (EPROTOTYPE)    │  │  │
//! │  │  └────────────┘  └────────────┘  └──────────────────┘  │  │
//! │  └───────────────────────────┬────────────────────────────┘  │
//! └──────────────────────────────┼───────────────────────────────┘
//!                                │ TransportSignal
//!              ┌─────────────────┴─────────────────┐
//!              │                                   │
//!     ┌────────┴─────────┐              ┌──────────┴─────────┐
//!     │ StreamTransport  │              │ DatagramTransport  │
//!     │ (tokio UnixStream)              │ (tokio UnixDatagram)
//!     └──────────────────┘              └────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`AdaptiveSocket`]: The socket handle; owns the driver task
//! - [`SocketEvent`]: `Connect`, `Error`, `Close` and `Drain` notifications
//! - [`ConnectOptions`]: Endpoint path and preferred [`TransportKind`]
//! - [`MessageWriter`]: The single-outstanding-write contract
//! - [`SocketError`]: Everything that can go wrong
//!
//! # Quick Start
//!
//! ```no_run
//! use unixsock_core::{AdaptiveSocket, SocketEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), unixsock_core::SocketError> {
//!     let socket = AdaptiveSocket::new();
//!     let mut events = socket.subscribe();
//!
//!     // Stream first; switches to datagram if the endpoint is one
//!     socket.connect("/tmp/app.sock")?.await?;
//!
//!     socket.write("hello")?.await?;
//!     socket.end().await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if matches!(event, SocketEvent::Close) {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`socket`]: The adaptive socket and its driver
//! - [`transport`]: Stream and datagram transport contracts and Unix implementations
//! - [`writer`]: Writer trait and completion futures
//! - [`state`]: Connection state
//! - [`config`]: Connect options and TOML/env configuration
//! - [`error`]: Error types

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod socket;
pub mod state;
pub mod transport;
pub mod writer;

// Re-exports for convenience
pub use socket::{AdaptiveSocket, SocketEvent};
pub use state::ConnectionState;
pub use transport::{
    DatagramTransport, HandleId, SignalSender, StreamTransport, TransportEvent, TransportFactory,
    TransportHandle, TransportSignal, UnixTransportFactory,
};
pub use writer::{Completion, MessageWriter, PendingConnect, PendingEnd, PendingWrite};

// Error exports
pub use error::{is_wrong_transport_type, SocketError};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, ConnectOptions, ConnectTarget, SocketConfig, SocketToml, TransportKind,
    UnixsockToml, DEFAULT_EVENT_CAPACITY,
};
