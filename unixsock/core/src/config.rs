//! Socket Configuration
//!
//! Transport selection, per-connect options, and the optional TOML
//! configuration file at `~/.config/unixsock/unixsock.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [socket]
//! path = "/dev/log"
//! type = "datagram"
//! event_capacity = 64
//! ```
//!
//! # Environment Variables
//!
//! - `UNIXSOCK_PATH`: endpoint socket path
//! - `UNIXSOCK_TYPE`: "stream" or "datagram" (also "tcp", "dgram", "udp")
//! - `UNIXSOCK_EVENT_CAPACITY`: broadcast capacity for socket events

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SocketError;

/// Default capacity of the socket event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

// =============================================================================
// Transport Kind
// =============================================================================

/// Which Unix socket type to open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Connection-oriented `SOCK_STREAM`
    #[default]
    #[serde(alias = "tcp")]
    Stream,
    /// Connectionless `SOCK_DGRAM`
    #[serde(alias = "dgram", alias = "udp")]
    Datagram,
}

impl TransportKind {
    /// The kind an auto-switch flips to
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Stream => Self::Datagram,
            Self::Datagram => Self::Stream,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => write!(f, "stream"),
            Self::Datagram => write!(f, "datagram"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" | "tcp" => Ok(Self::Stream),
            "datagram" | "dgram" | "udp" => Ok(Self::Datagram),
            other => Err(ConfigError::ValidationError(format!(
                "unknown transport type {other:?} (expected \"stream\" or \"datagram\")"
            ))),
        }
    }
}

// =============================================================================
// Connect Options
// =============================================================================

/// Options recognized by `connect`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Endpoint socket path
    pub path: Option<PathBuf>,

    /// Transport to try first
    #[serde(rename = "type")]
    pub kind: Option<TransportKind>,
}

impl ConnectOptions {
    /// Empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint path
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the transport to try first
    #[must_use]
    pub fn kind(mut self, kind: TransportKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Try a stream socket first
    #[must_use]
    pub fn stream(self) -> Self {
        self.kind(TransportKind::Stream)
    }

    /// Try a datagram socket first
    #[must_use]
    pub fn datagram(self) -> Self {
        self.kind(TransportKind::Datagram)
    }
}

/// Arguments accepted by `connect`
///
/// Converts from a bare path, a [`ConnectOptions`], a `(path, options)` pair,
/// or `()` to reuse the options given at construction.
#[derive(Clone, Debug, Default)]
pub struct ConnectTarget {
    path: Option<PathBuf>,
    options: ConnectOptions,
}

impl ConnectTarget {
    /// Resolve the endpoint path and transport kind against `defaults`
    ///
    /// `options.path` wins over the positional path, which wins over the
    /// defaults. The kind falls back to `defaults`, then to stream.
    ///
    /// # Errors
    ///
    /// Returns `SocketError::MissingPath` if no path is known.
    pub fn resolve(
        self,
        defaults: &ConnectOptions,
    ) -> Result<(PathBuf, TransportKind), SocketError> {
        let path = self
            .options
            .path
            .or(self.path)
            .or_else(|| defaults.path.clone())
            .ok_or(SocketError::MissingPath)?;
        let kind = self.options.kind.or(defaults.kind).unwrap_or_default();
        Ok((path, kind))
    }
}

impl From<()> for ConnectTarget {
    fn from((): ()) -> Self {
        Self::default()
    }
}

impl From<&str> for ConnectTarget {
    fn from(path: &str) -> Self {
        PathBuf::from(path).into()
    }
}

impl From<String> for ConnectTarget {
    fn from(path: String) -> Self {
        PathBuf::from(path).into()
    }
}

impl From<&Path> for ConnectTarget {
    fn from(path: &Path) -> Self {
        path.to_path_buf().into()
    }
}

impl From<&PathBuf> for ConnectTarget {
    fn from(path: &PathBuf) -> Self {
        path.clone().into()
    }
}

impl From<PathBuf> for ConnectTarget {
    fn from(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            options: ConnectOptions::default(),
        }
    }
}

impl From<ConnectOptions> for ConnectTarget {
    fn from(options: ConnectOptions) -> Self {
        Self {
            path: None,
            options,
        }
    }
}

impl<P: Into<PathBuf>> From<(P, ConnectOptions)> for ConnectTarget {
    fn from((path, options): (P, ConnectOptions)) -> Self {
        Self {
            path: Some(path.into()),
            options,
        }
    }
}

// =============================================================================
// Configuration File
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// `[socket]` section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketToml {
    /// Endpoint socket path
    pub path: Option<PathBuf>,

    /// Transport to try first
    #[serde(rename = "type")]
    pub kind: Option<TransportKind>,

    /// Broadcast capacity for socket events
    pub event_capacity: Option<usize>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnixsockToml {
    /// Socket settings
    pub socket: SocketToml,
}

/// Resolved socket configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketConfig {
    /// Defaults passed to `AdaptiveSocket::with_options`
    pub options: ConnectOptions,

    /// Broadcast capacity for socket events
    pub event_capacity: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            options: ConnectOptions::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl SocketConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check invariants that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `event_capacity` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "event_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/unixsock/unixsock.toml`, or
/// `~/.config/unixsock/unixsock.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("unixsock").join("unixsock.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<SocketConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read, parsed,
/// or validated.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<SocketConfig, ConfigError> {
    let mut config = SocketConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: UnixsockToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut SocketConfig, toml: &UnixsockToml) {
    if let Some(ref path) = toml.socket.path {
        config.options.path = Some(path.clone());
    }
    if let Some(kind) = toml.socket.kind {
        config.options.kind = Some(kind);
    }
    if let Some(capacity) = toml.socket.event_capacity {
        config.event_capacity = capacity;
    }
}

/// Apply `UNIXSOCK_*` variables read through `lookup`
fn apply_env_config(
    config: &mut SocketConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let mut touched = false;

    if let Some(path) = lookup("UNIXSOCK_PATH") {
        config.options.path = Some(PathBuf::from(path));
        touched = true;
    }

    if let Some(kind) = lookup("UNIXSOCK_TYPE") {
        config.options.kind = Some(kind.parse()?);
        touched = true;
    }

    if let Some(capacity) = lookup("UNIXSOCK_EVENT_CAPACITY") {
        config.event_capacity = capacity.parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "UNIXSOCK_EVENT_CAPACITY must be a number, got {capacity:?}"
            ))
        })?;
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

/// CLI overrides applied on top of the loaded configuration
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Socket path override
    pub path: Option<PathBuf>,

    /// Transport kind override
    pub kind: Option<TransportKind>,
}

impl ConfigOverrides {
    /// Create empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the socket path
    #[must_use]
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Override the transport kind
    #[must_use]
    pub fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Apply the overrides to a configuration
    pub fn apply(&self, config: &mut SocketConfig) {
        let mut touched = false;

        if let Some(ref path) = self.path {
            config.options.path = Some(path.clone());
            touched = true;
        }
        if let Some(kind) = self.kind {
            config.options.kind = Some(kind);
            touched = true;
        }

        if touched {
            config.source = ConfigSource::Cli;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_transport_kind_parse_aliases() {
        assert_eq!("stream".parse::<TransportKind>().unwrap(), TransportKind::Stream);
        assert_eq!("TCP".parse::<TransportKind>().unwrap(), TransportKind::Stream);
        assert_eq!("dgram".parse::<TransportKind>().unwrap(), TransportKind::Datagram);
        assert_eq!("udp".parse::<TransportKind>().unwrap(), TransportKind::Datagram);
        assert!("pipe".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_transport_kind_other() {
        assert_eq!(TransportKind::Stream.other(), TransportKind::Datagram);
        assert_eq!(TransportKind::Datagram.other(), TransportKind::Stream);
        assert_eq!(TransportKind::default(), TransportKind::Stream);
    }

    #[test]
    fn test_target_options_path_wins() {
        let target: ConnectTarget =
            ("/tmp/positional.sock", ConnectOptions::new().path("/tmp/option.sock")).into();
        let (path, kind) = target.resolve(&ConnectOptions::default()).unwrap();

        assert_eq!(path, PathBuf::from("/tmp/option.sock"));
        assert_eq!(kind, TransportKind::Stream);
    }

    #[test]
    fn test_target_falls_back_to_defaults() {
        let defaults = ConnectOptions::new().path("/tmp/default.sock").datagram();
        let (path, kind) = ConnectTarget::from(()).resolve(&defaults).unwrap();

        assert_eq!(path, PathBuf::from("/tmp/default.sock"));
        assert_eq!(kind, TransportKind::Datagram);
    }

    #[test]
    fn test_target_kind_overrides_defaults() {
        let defaults = ConnectOptions::new().datagram();
        let target: ConnectTarget = ("/tmp/a.sock", ConnectOptions::new().stream()).into();
        let (_, kind) = target.resolve(&defaults).unwrap();

        assert_eq!(kind, TransportKind::Stream);
    }

    #[test]
    fn test_target_missing_path() {
        let result = ConnectTarget::from(()).resolve(&ConnectOptions::default());
        assert!(matches!(result, Err(SocketError::MissingPath)));
    }

    #[test]
    fn test_parse_socket_toml() {
        let toml_content = r#"
[socket]
path = "/dev/log"
type = "dgram"
event_capacity = 16
"#;
        let parsed: UnixsockToml = toml::from_str(toml_content).unwrap();
        assert_eq!(parsed.socket.path, Some(PathBuf::from("/dev/log")));
        assert_eq!(parsed.socket.kind, Some(TransportKind::Datagram));

        let mut config = SocketConfig::default();
        apply_toml_config(&mut config, &parsed);

        assert_eq!(config.options.path, Some(PathBuf::from("/dev/log")));
        assert_eq!(config.options.kind, Some(TransportKind::Datagram));
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_parse_empty_toml() {
        let parsed: UnixsockToml = toml::from_str("").unwrap();
        let mut config = SocketConfig::default();
        apply_toml_config(&mut config, &parsed);

        assert_eq!(config, SocketConfig::default());
    }

    #[test]
    fn test_malformed_toml_error() {
        let result: Result<UnixsockToml, _> = toml::from_str("[socket\npath = ");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_graceful() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config_from_path(Some(dir.path().join("absent.toml"))).unwrap();

        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_load_from_file_records_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[socket]\nevent_capacity = 8\n").unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[socket]\nevent_capacity = 0\n").unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = SocketConfig::default();
        config.options.path = Some(PathBuf::from("/tmp/file.sock"));
        config.source = ConfigSource::File;

        apply_env_config(
            &mut config,
            env(&[("UNIXSOCK_PATH", "/tmp/env.sock"), ("UNIXSOCK_TYPE", "datagram")]),
        )
        .unwrap();

        assert_eq!(config.options.path, Some(PathBuf::from("/tmp/env.sock")));
        assert_eq!(config.options.kind, Some(TransportKind::Datagram));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_env_bad_capacity() {
        let mut config = SocketConfig::default();
        let result = apply_env_config(&mut config, env(&[("UNIXSOCK_EVENT_CAPACITY", "lots")]));

        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_empty_env_no_change() {
        let mut config = SocketConfig::default();
        apply_env_config(&mut config, env(&[])).unwrap();

        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = SocketConfig::default();
        apply_env_config(&mut config, env(&[("UNIXSOCK_TYPE", "stream")])).unwrap();

        ConfigOverrides::new()
            .with_path(PathBuf::from("/tmp/cli.sock"))
            .with_kind(TransportKind::Datagram)
            .apply(&mut config);

        assert_eq!(config.options.path, Some(PathBuf::from("/tmp/cli.sock")));
        assert_eq!(config.options.kind, Some(TransportKind::Datagram));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = SocketConfig::default();
        ConfigOverrides::new().apply(&mut config);

        assert_eq!(config, SocketConfig::default());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("unixsock.toml"));
        }
    }

    #[test]
    fn test_connect_options_serde_uses_type_key() {
        let options: ConnectOptions =
            toml::from_str("path = \"/tmp/x.sock\"\ntype = \"tcp\"\n").unwrap();

        assert_eq!(options, ConnectOptions::new().path("/tmp/x.sock").stream());
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}
