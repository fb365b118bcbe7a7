// rust/stream-core/src/dataset/iterator.rs

use std::sync::Arc;

use super::diagnostics::{DiagnosticSink, MissingField, TracingSink};
use super::prefetch::PrefetchQueue;
use super::traits::{Batch, FieldSelection, Record};
use crate::error::Result;

/// Cursor position of a `RecordIterator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No batch loaded; the next call pops one.
    Empty,
    /// A batch is loaded and `index` records of it have been yielded.
    BatchLoaded { batch_index: u64, index: usize },
    /// The queue is closed and drained, or an error was returned.
    Exhausted,
}

enum Cursor {
    Empty,
    BatchLoaded {
        batch: Batch,
        batch_index: u64,
        index: usize,
    },
    Exhausted,
}

/// An iterator over individual records of prefetched batches.
///
/// The `RecordIterator` pops a batch from the prefetch queue only when the
/// current one has yielded `batch_size` records, then projects one index at
/// a time into a `Record`. A field that has no value at the current index
/// is left out of that record and reported to the diagnostic sink.
pub struct RecordIterator {
    queue: Arc<PrefetchQueue>,
    batch_size: usize,
    fields: Option<FieldSelection>,
    sink: Box<dyn DiagnosticSink>,
    cursor: Cursor,
    batches_popped: u64,
}

impl RecordIterator {
    /// Create a new record iterator.
    ///
    /// # Arguments
    ///
    /// * `queue` - The queue the prefetch worker fills
    /// * `batch_size` - Records consumed from each popped batch
    /// * `fields` - Optional projection; all batch fields when `None`
    pub fn new(
        queue: Arc<PrefetchQueue>,
        batch_size: usize,
        fields: Option<FieldSelection>,
    ) -> Self {
        Self {
            queue,
            batch_size,
            fields,
            sink: Box::new(TracingSink),
            cursor: Cursor::Empty,
            batches_popped: 0,
        }
    }

    /// Replace the diagnostic sink (defaults to `TracingSink`).
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Read the next record.
    ///
    /// Returns `Ok(Some(Record))` for each record, `Ok(None)` once the worker
    /// has finished and every batch has been consumed, or the error that
    /// stopped the worker. After `Ok(None)` or an error the iterator is
    /// exhausted.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            match &mut self.cursor {
                Cursor::Exhausted => return Ok(None),
                Cursor::BatchLoaded {
                    batch,
                    batch_index,
                    index,
                } if *index < self.batch_size => {
                    let record = project(
                        batch,
                        *index,
                        *batch_index,
                        self.fields.as_ref(),
                        self.sink.as_ref(),
                    );
                    *index += 1;
                    return Ok(Some(record));
                }
                // Nothing loaded, or the current batch is used up
                _ => self.load_next_batch()?,
            }
        }
    }

    /// Pops the next batch, blocking until the worker provides one.
    fn load_next_batch(&mut self) -> Result<()> {
        match self.queue.pop() {
            None => {
                self.cursor = Cursor::Exhausted;
                Ok(())
            }
            Some(Err(e)) => {
                self.cursor = Cursor::Exhausted;
                Err(e)
            }
            Some(Ok(batch)) => {
                let batch_index = self.batches_popped;
                self.batches_popped += 1;

                let rows = batch.num_rows();
                if rows != self.batch_size {
                    tracing::debug!(
                        batch_index,
                        rows,
                        batch_size = self.batch_size,
                        "batch row count differs from configured batch size"
                    );
                }

                self.cursor = Cursor::BatchLoaded {
                    batch,
                    batch_index,
                    index: 0,
                };
                Ok(())
            }
        }
    }

    /// Get the current cursor state.
    pub fn state(&self) -> CursorState {
        match &self.cursor {
            Cursor::Empty => CursorState::Empty,
            Cursor::BatchLoaded {
                batch_index, index, ..
            } => CursorState::BatchLoaded {
                batch_index: *batch_index,
                index: *index,
            },
            Cursor::Exhausted => CursorState::Exhausted,
        }
    }

    /// Number of batches taken from the queue so far.
    pub fn batches_popped(&self) -> u64 {
        self.batches_popped
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn fields(&self) -> Option<&FieldSelection> {
        self.fields.as_ref()
    }
}

impl Iterator for RecordIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Builds the record at `index`, skipping fields without a value there.
fn project(
    batch: &Batch,
    index: usize,
    batch_index: u64,
    fields: Option<&FieldSelection>,
    sink: &dyn DiagnosticSink,
) -> Record {
    let mut record = Record::new();
    let mut take = |field: &str| match batch.get(field, index) {
        Some(value) => {
            record.insert(field.to_string(), value.clone());
        }
        None => sink.missing_field(&MissingField {
            field: field.to_string(),
            index,
            batch_index,
        }),
    };

    match fields {
        Some(selection) => selection.iter().for_each(&mut take),
        None => batch.field_names().for_each(&mut take),
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::diagnostics::CollectingSink;
    use crate::dataset::traits::Value;
    use crate::error::StreamError;

    fn queue_with(batches: Vec<Batch>) -> Arc<PrefetchQueue> {
        let queue = Arc::new(PrefetchQueue::new(batches.len().max(1)));
        for batch in batches {
            queue.push(Ok(batch)).unwrap();
        }
        queue.close();
        queue
    }

    fn abc_batch() -> Batch {
        Batch::new()
            .with_column("a", [1, 2])
            .with_column("b", [10, 20])
            .with_column("c", [100, 200])
    }

    fn record(pairs: &[(&str, i64)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Int(*v)))
            .collect()
    }

    #[test]
    fn test_field_selection_projects_only_selected() {
        let queue = queue_with(vec![abc_batch()]);
        let mut iter = RecordIterator::new(queue, 2, Some(FieldSelection::new(["a", "b"])));

        assert_eq!(iter.next_record().unwrap(), Some(record(&[("a", 1), ("b", 10)])));
        assert_eq!(iter.next_record().unwrap(), Some(record(&[("a", 2), ("b", 20)])));
        assert_eq!(iter.next_record().unwrap(), None);
    }

    #[test]
    fn test_record_keys_follow_selection_order() {
        let queue = queue_with(vec![abc_batch()]);
        let mut iter = RecordIterator::new(queue, 2, Some(FieldSelection::new(["c", "a"])));

        let record = iter.next_record().unwrap().unwrap();
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["c", "a"]);
        assert_eq!(record.get_index(0), Some((&"c".to_string(), &Value::Int(100))));
    }

    #[test]
    fn test_no_selection_projects_all_fields() {
        let queue = queue_with(vec![abc_batch()]);
        let mut iter = RecordIterator::new(queue, 2, None);

        assert_eq!(
            iter.next_record().unwrap(),
            Some(record(&[("a", 1), ("b", 10), ("c", 100)]))
        );
        assert_eq!(
            iter.next_record().unwrap(),
            Some(record(&[("a", 2), ("b", 20), ("c", 200)]))
        );
    }

    #[test]
    fn test_batch_then_index_order() {
        let batches: Vec<Batch> = (0..3)
            .map(|b| Batch::new().with_column("id", (0..4).map(|i| b * 4 + i)))
            .collect();
        let iter = RecordIterator::new(queue_with(batches), 4, None);

        let ids: Vec<i64> = iter
            .map(|r| r.unwrap()["id"].as_int().unwrap())
            .collect();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_missing_field_is_omitted_and_reported() {
        let batch = Batch::new()
            .with_column("a", [1, 2])
            .with_column("b", [10]);
        let sink = CollectingSink::new();
        let mut iter = RecordIterator::new(queue_with(vec![batch]), 2, Some(FieldSelection::new(["a", "b"])))
            .with_sink(Box::new(sink.clone()));

        assert_eq!(iter.next_record().unwrap(), Some(record(&[("a", 1), ("b", 10)])));
        assert_eq!(iter.next_record().unwrap(), Some(record(&[("a", 2)])));

        assert_eq!(
            sink.notices(),
            vec![MissingField {
                field: "b".to_string(),
                index: 1,
                batch_index: 0,
            }]
        );
    }

    #[test]
    fn test_selected_field_absent_from_batch() {
        let sink = CollectingSink::new();
        let mut iter = RecordIterator::new(
            queue_with(vec![abc_batch()]),
            2,
            Some(FieldSelection::new(["a", "label"])),
        )
        .with_sink(Box::new(sink.clone()));

        assert_eq!(iter.next_record().unwrap(), Some(record(&[("a", 1)])));
        assert_eq!(iter.next_record().unwrap(), Some(record(&[("a", 2)])));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_short_batch_still_consumes_batch_size_records() {
        let batches = vec![
            Batch::new().with_column("id", [1]),
            Batch::new().with_column("id", [2, 3]),
        ];
        let sink = CollectingSink::new();
        let mut iter = RecordIterator::new(queue_with(batches), 2, None).with_sink(Box::new(sink.clone()));

        assert_eq!(iter.next_record().unwrap(), Some(record(&[("id", 1)])));
        assert_eq!(iter.next_record().unwrap(), Some(Record::new()));
        assert_eq!(iter.next_record().unwrap(), Some(record(&[("id", 2)])));
        assert_eq!(iter.next_record().unwrap(), Some(record(&[("id", 3)])));
        assert_eq!(iter.next_record().unwrap(), None);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_state_transitions() {
        let mut iter = RecordIterator::new(queue_with(vec![abc_batch()]), 2, None);
        assert_eq!(iter.state(), CursorState::Empty);

        iter.next_record().unwrap();
        assert_eq!(iter.state(), CursorState::BatchLoaded { batch_index: 0, index: 1 });

        iter.next_record().unwrap();
        assert_eq!(iter.state(), CursorState::BatchLoaded { batch_index: 0, index: 2 });

        assert!(iter.next_record().unwrap().is_none());
        assert_eq!(iter.state(), CursorState::Exhausted);
        assert_eq!(iter.batches_popped(), 1);

        // Stays exhausted
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_worker_error_surfaces_after_buffered_batches() {
        let queue = Arc::new(PrefetchQueue::new(4));
        queue.push(Ok(abc_batch())).unwrap();
        queue.push(Err(StreamError::decode("corrupted batch"))).unwrap();
        queue.close();

        let results: Vec<_> = RecordIterator::new(queue, 2, None).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(results[2], Err(StreamError::Decode { .. })));
    }

    #[test]
    fn test_empty_stream_ends_immediately() {
        let mut iter = RecordIterator::new(queue_with(vec![]), 8, None);
        assert!(iter.next_record().unwrap().is_none());
        assert_eq!(iter.batches_popped(), 0);
    }
}
