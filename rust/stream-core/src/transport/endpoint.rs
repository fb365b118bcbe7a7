// rust/stream-core/src/transport/endpoint.rs

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::channel::{Channel, FramedChannel};
use crate::config::ConnectionConfig;
use crate::error::{Result, StreamError};

/// Wire transport used to reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Length-prefixed frames over a plain TCP or Unix stream.
    #[default]
    Framed,
    /// ZeroMQ REQ socket; requires the `zmq` cargo feature.
    Zmq,
}

impl TransportKind {
    /// Whether this build can open the transport.
    pub fn is_available(self) -> bool {
        match self {
            TransportKind::Framed => true,
            TransportKind::Zmq => cfg!(feature = "zmq"),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Framed => f.write_str("framed"),
            TransportKind::Zmq => f.write_str("zmq"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "framed" => Ok(TransportKind::Framed),
            "zmq" | "zeromq" => Ok(TransportKind::Zmq),
            _ => Err(StreamError::config(format!(
                "unknown transport: '{s}'. Expected 'framed' or 'zmq'"
            ))),
        }
    }
}

/// A parsed server address.
///
/// With the framed transport an `ipc://` address is a Unix domain socket
/// carrying length-prefixed frames, which a ZeroMQ REP server does not
/// understand. Use `TransportKind::Zmq` to reach ZeroMQ servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp://host:port` or bare `host:port`.
    Tcp(String),
    /// `ipc:///path/to/socket`.
    Ipc(PathBuf),
}

impl Endpoint {
    pub fn parse(address: &str) -> Result<Self> {
        if let Some(rest) = address.strip_prefix("tcp://") {
            if rest.is_empty() {
                return Err(StreamError::config(format!("missing host in address '{address}'")));
            }
            return Ok(Endpoint::Tcp(rest.to_string()));
        }
        if let Some(rest) = address.strip_prefix("ipc://") {
            if rest.is_empty() {
                return Err(StreamError::config(format!("missing path in address '{address}'")));
            }
            return Ok(Endpoint::Ipc(PathBuf::from(rest)));
        }
        if address.contains("://") {
            return Err(StreamError::config(format!(
                "unsupported address scheme in '{address}'. Expected 'tcp://' or 'ipc://'"
            )));
        }
        if address.contains(':') {
            return Ok(Endpoint::Tcp(address.to_string()));
        }
        Err(StreamError::config(format!(
            "invalid address '{address}'. Expected 'tcp://host:port', 'host:port' or 'ipc:///path'"
        )))
    }

    /// The address in ZeroMQ endpoint form; bare `host:port` becomes `tcp://`.
    pub fn to_uri(&self) -> String {
        match self {
            Endpoint::Tcp(host) => format!("tcp://{host}"),
            Endpoint::Ipc(path) => format!("ipc://{}", path.display()),
        }
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

/// Opens a channel to `config.address` over `config.transport`.
///
/// `request_timeout_ms` becomes the receive timeout, so a worker waiting
/// on a silent server eventually fails instead of blocking forever.
pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn Channel>> {
    let endpoint = Endpoint::parse(&config.address)?;
    match config.transport {
        TransportKind::Framed => connect_framed(config, endpoint),
        TransportKind::Zmq => connect_zmq(config, endpoint),
    }
}

#[cfg(feature = "zmq")]
fn connect_zmq(config: &ConnectionConfig, endpoint: Endpoint) -> Result<Box<dyn Channel>> {
    let channel = super::zmq_channel::ZmqChannel::connect(&endpoint.to_uri(), config)?;
    Ok(Box::new(channel))
}

#[cfg(not(feature = "zmq"))]
fn connect_zmq(config: &ConnectionConfig, _endpoint: Endpoint) -> Result<Box<dyn Channel>> {
    Err(StreamError::config(format!(
        "transport 'zmq' for '{}' needs stream-core built with the `zmq` feature",
        config.address
    )))
}

fn connect_framed(config: &ConnectionConfig, endpoint: Endpoint) -> Result<Box<dyn Channel>> {
    let address = config.address.as_str();
    let read_timeout = timeout_from_ms(config.request_timeout_ms);

    match endpoint {
        Endpoint::Tcp(host) => {
            let addrs = host.to_socket_addrs().map_err(|e| {
                StreamError::transport_with_source(address, "failed to resolve address", e)
            })?;
            let connect_timeout = Duration::from_millis(config.connect_timeout_ms.max(1));

            let mut last_error = None;
            for addr in addrs {
                match TcpStream::connect_timeout(&addr, connect_timeout) {
                    Ok(stream) => {
                        stream.set_nodelay(true).map_err(|e| {
                            StreamError::transport_with_source(address, "failed to set TCP_NODELAY", e)
                        })?;
                        stream.set_read_timeout(read_timeout).map_err(|e| {
                            StreamError::transport_with_source(address, "failed to set read timeout", e)
                        })?;
                        tracing::debug!(%addr, "connected to dataset server");
                        return Ok(Box::new(FramedChannel::new(
                            stream,
                            address,
                            config.max_frame_bytes,
                        )));
                    }
                    Err(e) => last_error = Some(e),
                }
            }

            Err(match last_error {
                Some(e) => StreamError::transport_with_source(address, "failed to connect", e),
                None => StreamError::transport(address, "address resolved to no socket addresses"),
            })
        }
        Endpoint::Ipc(path) => connect_ipc(address, path, read_timeout, config.max_frame_bytes),
    }
}

#[cfg(unix)]
fn connect_ipc(
    address: &str,
    path: PathBuf,
    read_timeout: Option<Duration>,
    max_frame_bytes: usize,
) -> Result<Box<dyn Channel>> {
    use std::os::unix::net::UnixStream;

    let stream = UnixStream::connect(&path)
        .map_err(|e| StreamError::transport_with_source(address, "failed to connect", e))?;
    stream
        .set_read_timeout(read_timeout)
        .map_err(|e| StreamError::transport_with_source(address, "failed to set read timeout", e))?;
    tracing::debug!(path = %path.display(), "connected to dataset server");
    Ok(Box::new(FramedChannel::new(stream, address, max_frame_bytes)))
}

#[cfg(not(unix))]
fn connect_ipc(
    address: &str,
    _path: PathBuf,
    _read_timeout: Option<Duration>,
    _max_frame_bytes: usize,
) -> Result<Box<dyn Channel>> {
    Err(StreamError::config(format!(
        "ipc addresses are only supported on unix platforms: '{address}'"
    )))
}
