//! In-memory dataset served to clients.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use stream_core::dataset::{Batch, BatchBuilder, Metadata, Record, Value};
use stream_core::{Result, StreamError};

/// A dataset loaded into columnar batches, plus the metadata that
/// describes it.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    metadata: Metadata,
    batches: Vec<Batch>,
}

impl DatasetSource {
    /// Groups `records` into batches of `batch_size` rows.
    pub fn from_records(records: Vec<Record>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(StreamError::config("batch_size must be greater than 0"));
        }

        let mut fields: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let length = records.len() as u64;

        let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));
        let mut builder = BatchBuilder::new();
        for record in records {
            for field in record.keys() {
                if seen.insert(field.clone()) {
                    fields.push(field.clone());
                }
            }
            builder.push_row(record);
            if builder.len() == batch_size {
                batches.push(std::mem::take(&mut builder).finish());
            }
        }
        if !builder.is_empty() {
            batches.push(builder.finish());
        }

        let metadata = Metadata {
            length,
            fields,
            batch_size: u32::try_from(batch_size).ok(),
        };
        Ok(Self { metadata, batches })
    }

    /// Reads one JSON object per line. Blank lines are skipped.
    pub fn from_jsonl<R: BufRead>(reader: R, batch_size: usize) -> Result<Self> {
        let mut records = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                StreamError::config_with_source(format!("failed to read line {}", number + 1), e)
            })?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(parse_record(&line, number + 1)?);
        }
        Self::from_records(records, batch_size)
    }

    pub fn from_jsonl_file(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            StreamError::config_with_source(
                format!("failed to open dataset '{}'", path.display()),
                e,
            )
        })?;
        Self::from_jsonl(BufReader::new(file), batch_size)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn batch(&self, index: usize) -> Option<&Batch> {
        self.batches.get(index)
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }
}

fn parse_record(line: &str, number: usize) -> Result<Record> {
    let json: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| StreamError::decode(format!("line {number}: invalid JSON: {e}")))?;

    match json {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| -> Result<(String, Value)> {
                let value = Value::try_from(value).map_err(|e| {
                    StreamError::decode(format!("line {number}, field '{key}': {e}"))
                })?;
                Ok((key, value))
            })
            .collect(),
        _ => Err(StreamError::decode(format!(
            "line {number}: expected a JSON object"
        ))),
    }
}
