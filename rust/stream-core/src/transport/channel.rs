// rust/stream-core/src/transport/channel.rs

use std::io::{ErrorKind, Read, Write};

use crate::error::{Result, StreamError};

/// A strictly alternating request/reply connection.
///
/// At most one request may be outstanding: every `send_request` must be
/// followed by exactly one `receive_response` before the next request.
pub trait Channel: Send {
    /// Sends one request message.
    fn send_request(&mut self, message: &[u8]) -> Result<()>;

    /// Blocks until the reply to the outstanding request arrives.
    fn receive_response(&mut self) -> Result<Vec<u8>>;

    /// Human-readable peer address, for logs and errors.
    fn peer(&self) -> &str;
}

/// Writes one length-prefixed frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(ErrorKind::InvalidInput, "frame larger than 4 GiB")
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Reads one length-prefixed frame, rejecting frames above `max_len` bytes.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> std::io::Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;

    if len > max_len {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit of {max_len} bytes"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// `Channel` over any byte stream, using length-prefixed frames.
pub struct FramedChannel<S> {
    stream: S,
    address: String,
    max_frame_bytes: usize,
    awaiting_reply: bool,
}

impl<S: Read + Write + Send> FramedChannel<S> {
    pub fn new(stream: S, address: impl Into<String>, max_frame_bytes: usize) -> Self {
        Self {
            stream,
            address: address.into(),
            max_frame_bytes,
            awaiting_reply: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> StreamError {
        match e.kind() {
            ErrorKind::InvalidData => StreamError::protocol(e.to_string()),
            ErrorKind::UnexpectedEof => {
                StreamError::transport_with_source(&self.address, "connection closed by peer", e)
            }
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                StreamError::transport_with_source(&self.address, format!("{action} timed out"), e)
            }
            _ => StreamError::transport_with_source(&self.address, format!("{action} failed"), e),
        }
    }
}

impl<S: Read + Write + Send> Channel for FramedChannel<S> {
    fn send_request(&mut self, message: &[u8]) -> Result<()> {
        if self.awaiting_reply {
            return Err(StreamError::protocol(
                "request sent while a previous request is still outstanding",
            ));
        }
        write_frame(&mut self.stream, message).map_err(|e| self.io_error("send", e))?;
        self.awaiting_reply = true;
        Ok(())
    }

    fn receive_response(&mut self) -> Result<Vec<u8>> {
        if !self.awaiting_reply {
            return Err(StreamError::protocol("receive without an outstanding request"));
        }
        let reply = read_frame(&mut self.stream, self.max_frame_bytes)
            .map_err(|e| self.io_error("receive", e))?;
        self.awaiting_reply = false;
        Ok(reply)
    }

    fn peer(&self) -> &str {
        &self.address
    }
}
