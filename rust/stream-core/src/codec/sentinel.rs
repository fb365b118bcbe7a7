// rust/stream-core/src/codec/sentinel.rs

use super::{deserialize_payload, serialize_payload, Codec, Reply};
use crate::dataset::{Batch, Metadata};
use crate::error::{Result, StreamError};

/// Length of the reply that marks end-of-stream.
pub const SENTINEL_LEN: usize = 8;

/// Untagged replies where exactly eight bytes means end-of-stream.
///
/// Kept for servers that predate the tagged format. A payload that happens
/// to encode to eight bytes cannot be told apart from the sentinel, so
/// `encode_batch` refuses to produce one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentinelCodec;

impl SentinelCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for SentinelCodec {
    fn decode_metadata(&self, bytes: &[u8]) -> Result<Metadata> {
        if bytes.is_empty() {
            return Err(StreamError::protocol("empty reply to Info request"));
        }
        deserialize_payload(bytes, "metadata")
    }

    fn decode_reply(&self, bytes: Vec<u8>) -> Result<Reply> {
        if bytes.len() == SENTINEL_LEN {
            return Ok(Reply::EndOfStream);
        }
        deserialize_payload::<Batch>(&bytes, "batch").map(Reply::Batch)
    }

    fn encode_metadata(&self, metadata: &Metadata) -> Result<Vec<u8>> {
        serialize_payload(metadata)
    }

    fn encode_batch(&self, batch: &Batch) -> Result<Vec<u8>> {
        let bytes = serialize_payload(batch)?;
        if bytes.len() == SENTINEL_LEN {
            return Err(StreamError::encode(
                "batch encodes to 8 bytes and would be read as end-of-stream",
            ));
        }
        Ok(bytes)
    }

    fn encode_end_of_stream(&self) -> Vec<u8> {
        vec![0u8; SENTINEL_LEN]
    }

    fn name(&self) -> &'static str {
        "sentinel"
    }
}
