// rust/stream-core/src/dataset/diagnostics.rs

//! Non-fatal notices raised while projecting batches into records.

use std::sync::{Arc, Mutex};

/// A requested field had no value at a given index of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    pub field: String,
    /// Record index within the batch.
    pub index: usize,
    /// Zero-based position of the batch in the stream.
    pub batch_index: u64,
}

/// Receives projection notices; the iterator never fails on these.
pub trait DiagnosticSink: Send {
    fn missing_field(&self, notice: &MissingField);
}

/// Logs each notice through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn missing_field(&self, notice: &MissingField) {
        tracing::warn!(
            field = %notice.field,
            index = notice.index,
            batch_index = notice.batch_index,
            "field missing from batch, omitted from record"
        );
    }
}

/// Keeps every notice in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    notices: Arc<Mutex<Vec<MissingField>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the notices collected so far.
    pub fn notices(&self) -> Vec<MissingField> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for CollectingSink {
    fn missing_field(&self, notice: &MissingField) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice.clone());
    }
}
