// rust/stream-core/src/codec/tagged.rs

use super::{deserialize_payload, serialize_payload, Codec, Reply};
use crate::dataset::{Batch, Metadata};
use crate::error::{Result, StreamError};

pub const KIND_METADATA: u8 = 0x01;
pub const KIND_BATCH: u8 = 0x02;
pub const KIND_END_OF_STREAM: u8 = 0x03;

/// Replies prefixed with a one-byte kind discriminant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedCodec;

impl TaggedCodec {
    pub fn new() -> Self {
        Self
    }

    fn tagged(kind: u8, payload: Vec<u8>) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.push(kind);
        out.extend_from_slice(&payload);
        out
    }
}

impl Codec for TaggedCodec {
    fn decode_metadata(&self, bytes: &[u8]) -> Result<Metadata> {
        match bytes.split_first() {
            None => Err(StreamError::protocol("empty reply to Info request")),
            Some((&KIND_METADATA, payload)) => deserialize_payload(payload, "metadata"),
            Some((kind, _)) => Err(StreamError::protocol(format!(
                "expected metadata reply, got kind {kind:#04x}"
            ))),
        }
    }

    fn decode_reply(&self, bytes: Vec<u8>) -> Result<Reply> {
        match bytes.split_first() {
            None => Err(StreamError::protocol("empty reply to Data request")),
            Some((&KIND_BATCH, payload)) => {
                deserialize_payload::<Batch>(payload, "batch").map(Reply::Batch)
            }
            Some((&KIND_END_OF_STREAM, [])) => Ok(Reply::EndOfStream),
            Some((&KIND_END_OF_STREAM, rest)) => Err(StreamError::protocol(format!(
                "end-of-stream reply carries {} unexpected bytes",
                rest.len()
            ))),
            Some((&KIND_METADATA, _)) => {
                Err(StreamError::protocol("metadata reply to a Data request"))
            }
            Some((kind, _)) => Err(StreamError::protocol(format!(
                "unknown reply kind {kind:#04x}"
            ))),
        }
    }

    fn encode_metadata(&self, metadata: &Metadata) -> Result<Vec<u8>> {
        Ok(Self::tagged(KIND_METADATA, serialize_payload(metadata)?))
    }

    fn encode_batch(&self, batch: &Batch) -> Result<Vec<u8>> {
        Ok(Self::tagged(KIND_BATCH, serialize_payload(batch)?))
    }

    fn encode_end_of_stream(&self) -> Vec<u8> {
        vec![KIND_END_OF_STREAM]
    }

    fn name(&self) -> &'static str {
        "tagged"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_exchange() {
        let codec = TaggedCodec::new();
        let metadata = Metadata {
            length: 10_000,
            fields: vec!["input_ids".to_string(), "labels".to_string()],
            batch_size: Some(1024),
        };

        let bytes = codec.encode_metadata(&metadata).unwrap();
        assert_eq!(bytes[0], KIND_METADATA);
        assert_eq!(codec.decode_metadata(&bytes).unwrap(), metadata);
    }

    #[test]
    fn test_end_of_stream_is_explicit() {
        let codec = TaggedCodec::new();
        let end = codec.encode_end_of_stream();
        assert_eq!(end, vec![KIND_END_OF_STREAM]);
        assert_eq!(codec.decode_reply(end).unwrap(), Reply::EndOfStream);
    }

    #[test]
    fn test_eight_byte_batch_is_not_end_of_stream() {
        let codec = TaggedCodec::new();
        // An empty batch encodes to an 8-byte payload; the tag keeps it a batch.
        let bytes = codec.encode_batch(&Batch::new()).unwrap();
        assert_eq!(bytes.len(), 9);
        assert_eq!(codec.decode_reply(bytes).unwrap(), Reply::Batch(Batch::new()));
    }

    #[test]
    fn test_protocol_violations() {
        let codec = TaggedCodec::new();

        let err = codec.decode_reply(vec![]).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation { .. }));

        let err = codec.decode_reply(vec![0x7f, 1, 2]).unwrap_err();
        assert!(err.to_string().contains("0x7f"));

        let err = codec.decode_reply(vec![KIND_END_OF_STREAM, 0]).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation { .. }));

        let metadata = codec.encode_metadata(&Metadata::new(1)).unwrap();
        let err = codec.decode_reply(metadata).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation { .. }));

        let batch = codec.encode_batch(&Batch::new()).unwrap();
        let err = codec.decode_metadata(&batch).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation { .. }));
    }

    #[test]
    fn test_trailing_bytes_after_payload_rejected() {
        let codec = TaggedCodec::new();
        let mut bytes = codec
            .encode_batch(&Batch::new().with_column("a", [1, 2]))
            .unwrap();
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x00]);

        let err = codec.decode_reply(bytes).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation { .. }));

        let mut bytes = codec.encode_metadata(&Metadata::new(4)).unwrap();
        bytes.push(0);
        let err = codec.decode_metadata(&bytes).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation { .. }));
    }

    #[test]
    fn test_truncated_batch_is_decode_error() {
        let codec = TaggedCodec::new();
        let batch = Batch::new().with_column("text", ["hello", "world"]);
        let mut bytes = codec.encode_batch(&batch).unwrap();
        bytes.truncate(bytes.len() - 3);

        let err = codec.decode_reply(bytes).unwrap_err();
        assert!(matches!(err, StreamError::Decode { .. }));
    }
}
