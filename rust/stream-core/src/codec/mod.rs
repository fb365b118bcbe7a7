// rust/stream-core/src/codec/mod.rs

//! Wire encoding of handshake metadata and data replies.
//!
//! Requests are the literal ASCII markers `Info` and `Data`. Replies carry
//! bincode-encoded payloads, and the codec decides how end-of-stream is
//! signalled:
//!
//! ```text
//! tagged:    +------+------------------+
//!            | kind | bincode payload  |   kind: 0x01 metadata, 0x02 batch, 0x03 end
//!            +------+------------------+
//!
//! sentinel:  +------------------+
//!            | bincode payload  |          a reply of exactly 8 bytes is end-of-stream
//!            +------------------+
//! ```

mod sentinel;
mod tagged;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::dataset::{Batch, Metadata};
use crate::error::{Result, StreamError};

pub use sentinel::{SentinelCodec, SENTINEL_LEN};
pub use tagged::{TaggedCodec, KIND_BATCH, KIND_END_OF_STREAM, KIND_METADATA};

/// A request sent over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// One-time handshake asking for dataset metadata.
    Info,
    /// Ask for the next batch.
    Data,
}

impl Request {
    pub const INFO_MARKER: &'static [u8] = b"Info";
    pub const DATA_MARKER: &'static [u8] = b"Data";

    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Request::Info => Self::INFO_MARKER,
            Request::Data => Self::DATA_MARKER,
        }
    }

    /// Parses a raw request frame, as seen by a server.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"Info" => Some(Request::Info),
            b"Data" => Some(Request::Data),
            _ => None,
        }
    }
}

/// A decoded reply to a `Data` request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Batch(Batch),
    EndOfStream,
}

/// Encodes and decodes replies. Implementations must be stateless.
pub trait Codec: Send + Sync {
    /// Decodes the reply to the `Info` handshake.
    fn decode_metadata(&self, bytes: &[u8]) -> Result<Metadata>;

    /// Classifies and decodes the reply to a `Data` request.
    fn decode_reply(&self, bytes: Vec<u8>) -> Result<Reply>;

    fn encode_metadata(&self, metadata: &Metadata) -> Result<Vec<u8>>;

    fn encode_batch(&self, batch: &Batch) -> Result<Vec<u8>>;

    fn encode_end_of_stream(&self) -> Vec<u8>;

    /// Name of this codec, as used in configuration.
    fn name(&self) -> &'static str;
}

/// How the server marks the end of the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndOfStreamMode {
    /// One-byte reply kind in front of every payload.
    #[default]
    Tagged,
    /// Any reply of exactly eight bytes.
    Sentinel,
}

impl EndOfStreamMode {
    pub fn codec(self) -> Arc<dyn Codec> {
        match self {
            EndOfStreamMode::Tagged => Arc::new(TaggedCodec::new()),
            EndOfStreamMode::Sentinel => Arc::new(SentinelCodec::new()),
        }
    }
}

impl fmt::Display for EndOfStreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndOfStreamMode::Tagged => f.write_str("tagged"),
            EndOfStreamMode::Sentinel => f.write_str("sentinel"),
        }
    }
}

impl FromStr for EndOfStreamMode {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tagged" => Ok(EndOfStreamMode::Tagged),
            "sentinel" => Ok(EndOfStreamMode::Sentinel),
            _ => Err(StreamError::config(format!(
                "unknown end-of-stream mode: '{s}'. Expected 'tagged' or 'sentinel'"
            ))),
        }
    }
}

/// Fixed-width integers, little-endian, and the whole reply must be consumed.
fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

pub(crate) fn serialize_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    payload_options()
        .serialize(value)
        .map_err(|e| StreamError::encode(e.to_string()))
}

/// Decodes a complete payload.
///
/// Bytes left over after a well-formed value mean the reply does not have
/// the expected shape, which is a protocol violation rather than a decode
/// error.
pub(crate) fn deserialize_payload<'a, T: Deserialize<'a>>(bytes: &'a [u8], what: &str) -> Result<T> {
    payload_options().deserialize(bytes).map_err(|e| {
        let prefix_decodes = payload_options()
            .allow_trailing_bytes()
            .deserialize::<T>(bytes)
            .is_ok();
        if prefix_decodes {
            StreamError::protocol(format!("{what} reply carries unexpected trailing bytes"))
        } else {
            StreamError::decode(format!("malformed {what} payload: {e}"))
        }
    })
}
