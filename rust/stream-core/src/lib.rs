// rust/stream-core/src/lib.rs

//! Remote Dataset Streaming - Core Library
//!
//! This crate streams a dataset served by a remote process, one record at a
//! time. A background worker prefetches columnar batches over a
//! request/reply channel into a bounded queue, and the consumer iterates
//! records projected from those batches.

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use config::{ConnectionConfig, StreamConfig, StreamOptions};
pub use error::{Result, StreamError};

pub mod codec;
pub use codec::{Codec, EndOfStreamMode, Reply, Request, SentinelCodec, TaggedCodec};

pub mod transport;
pub use transport::{connect, Channel, Endpoint, FramedChannel, TransportKind};

pub mod dataset;
pub use dataset::{
    Batch, BatchBuilder, BoundedBatchQueue, DiagnosticSink, FieldSelection, Metadata,
    PrefetchWorker, Record, RecordIterator, Value,
};

pub mod session;
pub use session::RemoteDataset;
