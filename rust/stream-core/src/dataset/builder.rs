// rust/stream-core/src/dataset/builder.rs

use std::collections::BTreeMap;

use super::traits::{Batch, Record, Value};

/// Accumulates row-oriented records into a columnar `Batch`.
///
/// Columns are padded with `Value::Null` so every column ends up with one
/// entry per pushed row, including columns first seen part way through.
#[derive(Debug, Default)]
pub struct BatchBuilder {
    columns: BTreeMap<String, Vec<Value>>,
    rows: usize,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, record: Record) {
        for (field, value) in record {
            let column = self
                .columns
                .entry(field)
                .or_insert_with(|| vec![Value::Null; self.rows]);
            column.push(value);
        }

        self.rows += 1;
        for column in self.columns.values_mut() {
            if column.len() < self.rows {
                column.push(Value::Null);
            }
        }
    }

    /// Number of rows pushed so far.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn finish(self) -> Batch {
        Batch::from_columns(self.columns)
    }
}
