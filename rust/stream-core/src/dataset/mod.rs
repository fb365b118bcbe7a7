// rust/stream-core/src/dataset/mod.rs

//! Record streaming on top of prefetched batches.
//!
//! A `PrefetchWorker` thread requests batches from the server and pushes
//! them onto a `BoundedBatchQueue`. A `RecordIterator` pops batches from the
//! other end and yields them one record at a time, optionally restricted to
//! a `FieldSelection`.
//!
//! # Example
//!
//! ```ignore
//! use stream_core::codec::EndOfStreamMode;
//! use stream_core::dataset::{PrefetchQueue, PrefetchWorker, RecordIterator};
//! use std::sync::Arc;
//!
//! let queue = Arc::new(PrefetchQueue::new(8));
//! let worker = PrefetchWorker::spawn(channel, EndOfStreamMode::Tagged.codec(), queue.clone())?;
//!
//! for record in RecordIterator::new(queue, 1024, None) {
//!     let record = record?;
//!     // Use record["label"]
//! }
//! ```

mod builder;
mod diagnostics;
mod iterator;
pub(crate) mod prefetch;
mod queue;
mod traits;

pub use builder::BatchBuilder;
pub use diagnostics::{CollectingSink, DiagnosticSink, MissingField, TracingSink};
pub use iterator::{CursorState, RecordIterator};
pub use prefetch::{PrefetchItem, PrefetchQueue, PrefetchWorker, WorkerOutcome, WorkerSummary};
pub use queue::{BoundedBatchQueue, PopTimeout, QueueClosed, DEFAULT_MAXSIZE};
pub use traits::{Batch, FieldSelection, Metadata, Record, Value};
