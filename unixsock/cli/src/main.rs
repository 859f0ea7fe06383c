//! unixsock-send - Write messages to a Unix socket endpoint
//!
//! Sends each message as one write over an [`AdaptiveSocket`], so the same
//! command works against stream daemons and datagram sinks such as syslog.
//!
//! # Usage
//!
//! ```bash
//! # Send two messages, trying a stream socket first
//! unixsock-send --socket /tmp/app.sock hello world
//!
//! # Datagram endpoint, one message per stdin line
//! journalctl -f | unixsock-send --socket /dev/log --type datagram
//!
//! # Endpoint from the config file or UNIXSOCK_PATH
//! unixsock-send --config ~/.config/unixsock/unixsock.toml "ping"
//!
//! # Verbose logging
//! RUST_LOG=debug unixsock-send -s /tmp/app.sock ping
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use unixsock_core::{
    default_config_path, load_config_from_path, AdaptiveSocket, ConfigOverrides, MessageWriter,
    SocketEvent, TransportKind,
};

/// Write messages to a Unix stream or datagram socket
#[derive(Parser, Debug)]
#[command(name = "unixsock-send")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Endpoint socket path
    #[arg(short = 's', long = "socket", value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Transport to try first (stream, datagram)
    #[arg(short = 't', long = "type", value_name = "KIND")]
    kind: Option<TransportKind>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "UNIXSOCK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "UNIXSOCK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Messages to send; one per stdin line when omitted
    #[arg(value_name = "MESSAGE")]
    messages: Vec<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref path) = self.socket_path {
            overrides = overrides.with_path(path.clone());
        }
        if let Some(kind) = self.kind {
            overrides = overrides.with_kind(kind);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("unixsock_cli={level},unixsock_core={level}"))
    });

    // stdout may be the thing being piped; keep logs on stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Write one message and wait for it to go out
async fn send<W: MessageWriter>(writer: &W, message: String) -> Result<()> {
    let len = message.len();
    writer
        .write(message.into())
        .context("Socket refused the write")?
        .await
        .with_context(|| format!("Failed to send {len}-byte message"))
}

async fn send_args<W: MessageWriter>(writer: &W, messages: Vec<String>) -> Result<usize> {
    let mut sent = 0;
    for message in messages {
        send(writer, message).await?;
        sent += 1;
    }
    Ok(sent)
}

async fn send_stdin<W: MessageWriter>(writer: &W) -> Result<usize> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        send(writer, line).await?;
        sent += 1;
    }
    Ok(sent)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = load_config_from_path(args.config.clone().or_else(default_config_path))
        .context("Failed to load configuration")?;
    args.overrides().apply(&mut config);

    if config.options.path.is_none() {
        anyhow::bail!("No endpoint path; pass --socket, set UNIXSOCK_PATH, or add [socket] path");
    }

    info!(
        path = ?config.options.path,
        kind = ?config.options.kind,
        source = %config.source(),
        "unixsock-send starting"
    );

    let socket = AdaptiveSocket::from_config(&config);
    let mut events = socket.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SocketEvent::Error(error) => warn!(error = %error, "Socket error"),
                SocketEvent::Close => break,
                _ => {}
            }
        }
    });

    socket
        .connect(())
        .context("Failed to start connecting")?
        .await
        .context("Failed to connect")?;

    let sent = if args.messages.is_empty() {
        send_stdin(&socket).await?
    } else {
        send_args(&socket, args.messages).await?
    };

    socket.end().await.context("Failed to close socket")?;

    info!(sent, kind = %socket.transport_kind(), "Done");
    Ok(())
}
