// rust/stream-core/src/transport/zmq_channel.rs

use std::io::ErrorKind;

use super::channel::Channel;
use crate::config::ConnectionConfig;
use crate::error::{Result, StreamError};

/// `Channel` over a ZeroMQ REQ socket.
///
/// ZeroMQ delimits messages itself, so requests and replies travel without
/// a length prefix and any REP server bound to the same `tcp://` or `ipc://`
/// endpoint can answer. Connecting never fails for an absent server; the
/// first receive times out instead.
pub struct ZmqChannel {
    // Keeps the context alive for as long as the socket.
    _context: zmq::Context,
    socket: zmq::Socket,
    address: String,
    max_frame_bytes: usize,
    awaiting_reply: bool,
}

/// ZeroMQ timeouts are `i32` milliseconds, with -1 meaning forever.
fn zmq_timeout(ms: u64) -> i32 {
    if ms == 0 {
        -1
    } else {
        i32::try_from(ms).unwrap_or(i32::MAX)
    }
}

fn zmq_error(address: &str, message: &str, e: zmq::Error) -> StreamError {
    let kind = match e {
        zmq::Error::EAGAIN => ErrorKind::TimedOut,
        _ => ErrorKind::Other,
    };
    let message = match kind {
        ErrorKind::TimedOut => format!("{message} timed out"),
        _ => format!("{message} failed"),
    };
    StreamError::transport_with_source(address, message, std::io::Error::new(kind, e))
}

impl ZmqChannel {
    /// Opens a REQ socket connected to `uri` (`tcp://...` or `ipc://...`).
    pub fn connect(uri: &str, config: &ConnectionConfig) -> Result<Self> {
        let context = zmq::Context::new();
        let socket = context
            .socket(zmq::REQ)
            .map_err(|e| zmq_error(uri, "create REQ socket", e))?;

        let timeout = zmq_timeout(config.request_timeout_ms);
        socket
            .set_rcvtimeo(timeout)
            .and_then(|()| socket.set_sndtimeo(timeout))
            .and_then(|()| socket.set_linger(0))
            .and_then(|()| {
                socket.set_maxmsgsize(i64::try_from(config.max_frame_bytes).unwrap_or(i64::MAX))
            })
            .map_err(|e| zmq_error(uri, "configure REQ socket", e))?;

        socket
            .connect(uri)
            .map_err(|e| zmq_error(uri, "connect", e))?;
        tracing::debug!(endpoint = uri, "connected ZeroMQ REQ socket");

        Ok(Self {
            _context: context,
            socket,
            address: uri.to_string(),
            max_frame_bytes: config.max_frame_bytes,
            awaiting_reply: false,
        })
    }
}

impl Channel for ZmqChannel {
    fn send_request(&mut self, message: &[u8]) -> Result<()> {
        if self.awaiting_reply {
            return Err(StreamError::protocol(
                "request sent while a previous request is still outstanding",
            ));
        }
        self.socket
            .send(message, 0)
            .map_err(|e| zmq_error(&self.address, "send", e))?;
        self.awaiting_reply = true;
        Ok(())
    }

    fn receive_response(&mut self) -> Result<Vec<u8>> {
        if !self.awaiting_reply {
            return Err(StreamError::protocol("receive without an outstanding request"));
        }
        let reply = self
            .socket
            .recv_bytes(0)
            .map_err(|e| zmq_error(&self.address, "receive", e))?;
        self.awaiting_reply = false;

        if reply.len() > self.max_frame_bytes {
            return Err(StreamError::protocol(format!(
                "reply of {} bytes exceeds limit of {} bytes",
                reply.len(),
                self.max_frame_bytes
            )));
        }
        Ok(reply)
    }

    fn peer(&self) -> &str {
        &self.address
    }
}
