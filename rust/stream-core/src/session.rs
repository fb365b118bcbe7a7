// rust/stream-core/src/session.rs

//! Client session over a remote dataset.
//!
//! `RemoteDataset` ties the pieces together: it connects, performs the
//! `Info` handshake, hands the channel to a `PrefetchWorker` and exposes the
//! records through a single shared `RecordIterator`.
//!
//! # Example
//!
//! ```no_run
//! use stream_core::{RemoteDataset, StreamConfig};
//!
//! let config = StreamConfig::for_address("tcp://127.0.0.1:5555");
//! let mut dataset = RemoteDataset::connect(&config).unwrap();
//! println!("Dataset has {} records", dataset.len());
//!
//! for record in &mut dataset {
//!     let record = record.unwrap();
//!     // Use record["label"]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::codec::{Codec, Request};
use crate::config::{StreamConfig, StreamOptions};
use crate::dataset::{
    DiagnosticSink, Metadata, PrefetchQueue, PrefetchWorker, Record, RecordIterator, TracingSink,
    WorkerOutcome, WorkerSummary,
};
use crate::error::{Result, StreamError};
use crate::transport::{self, Channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cancellation {
    Active,
    /// Cancelled mid-stream; the next read reports it.
    Pending,
    Reported,
}

/// A streaming view of a dataset served by a remote process.
///
/// The dataset length comes from the handshake and never changes. Records
/// come from one shared cursor, so iterating a second time continues where
/// the previous iteration stopped.
///
/// Every batch yields exactly `batch_size` records. When the final batch is
/// short, the records past its last row lack those fields (they are empty
/// when no field has a value there), so the number of records produced can
/// exceed `len()`. With `len() == 10` and `batch_size == 4` the stream
/// yields 12 records, the last 2 of them `{}`. Skip records missing the
/// fields you need, or serve a length that is a multiple of `batch_size`.
pub struct RemoteDataset {
    metadata: Metadata,
    queue: Arc<PrefetchQueue>,
    records: RecordIterator,
    worker: PrefetchWorker,
    cancellation: Cancellation,
}

impl RemoteDataset {
    /// Connects to `config.connection.address` and starts streaming.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the server cannot
    /// be reached, or the handshake fails.
    pub fn connect(config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        let channel = transport::connect(&config.connection)?;
        let codec = config.stream.end_of_stream.codec();
        Self::with_channel(channel, codec, &config.stream)
    }

    /// Loads a TOML configuration file, applies environment overrides and
    /// connects.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = StreamConfig::from_file(path)?.with_env_overrides();
        Self::connect(&config)
    }

    /// Starts a session over an already open channel, logging field
    /// diagnostics through `tracing`.
    pub fn with_channel(
        channel: Box<dyn Channel>,
        codec: Arc<dyn Codec>,
        options: &StreamOptions,
    ) -> Result<Self> {
        Self::with_channel_and_sink(channel, codec, options, Box::new(TracingSink))
    }

    /// Starts a session over an already open channel.
    ///
    /// Exactly one `Info` exchange happens here, before the worker takes
    /// ownership of the channel.
    pub fn with_channel_and_sink(
        mut channel: Box<dyn Channel>,
        codec: Arc<dyn Codec>,
        options: &StreamOptions,
        sink: Box<dyn DiagnosticSink>,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(StreamError::config("batch_size must be greater than 0"));
        }

        let metadata = handshake(channel.as_mut(), codec.as_ref())?;
        if let Some(advertised) = metadata.batch_size {
            if advertised as usize != options.batch_size {
                tracing::warn!(
                    advertised,
                    configured = options.batch_size,
                    "server batch size differs from configured batch size"
                );
            }
        }

        let queue = Arc::new(PrefetchQueue::new(options.maxsize));
        let worker = PrefetchWorker::spawn(channel, codec, queue.clone())?;
        let records = RecordIterator::new(queue.clone(), options.batch_size, options.field_selection())
            .with_sink(sink);

        Ok(Self {
            metadata,
            queue,
            records,
            worker,
            cancellation: Cancellation::Active,
        })
    }

    /// Total number of records, as advertised by the server.
    pub fn len(&self) -> u64 {
        self.metadata.length
    }

    /// Alias of `len`.
    pub fn length(&self) -> u64 {
        self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.length == 0
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Batches currently buffered in the prefetch queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Reads the next record from the shared cursor.
    ///
    /// After `cancel` interrupted the stream, the next call returns
    /// `StreamError::Cancelled` once and later calls return `Ok(None)`.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        match self.cancellation {
            Cancellation::Active => self.records.next_record(),
            Cancellation::Pending => {
                self.cancellation = Cancellation::Reported;
                Err(StreamError::Cancelled)
            }
            Cancellation::Reported => Ok(None),
        }
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// If the worker had already finished on its own (end-of-stream or
    /// error), the records it buffered can still be read.
    pub fn cancel(&mut self) -> Result<WorkerSummary> {
        let summary = self.worker.stop()?;
        if summary.outcome == WorkerOutcome::Cancelled && self.cancellation == Cancellation::Active {
            self.cancellation = Cancellation::Pending;
        }
        Ok(summary)
    }
}

impl Iterator for RemoteDataset {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl std::fmt::Debug for RemoteDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDataset")
            .field("metadata", &self.metadata)
            .field("queue_len", &self.queue.len())
            .field("cursor", &self.records.state())
            .finish()
    }
}

/// Sends `Info` and decodes the metadata reply.
fn handshake(channel: &mut dyn Channel, codec: &dyn Codec) -> Result<Metadata> {
    channel.send_request(Request::Info.as_bytes())?;
    let reply = channel.receive_response()?;
    let metadata = codec.decode_metadata(&reply)?;

    tracing::info!(
        peer = channel.peer(),
        length = metadata.length,
        fields = metadata.fields.len(),
        codec = codec.name(),
        "connected to dataset server"
    );
    Ok(metadata)
}
