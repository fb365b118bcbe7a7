// rust/stream-core/src/dataset/traits.rs

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// A single cell value carried by a batch column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    /// Returns the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = StreamError;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().ok_or_else(|| {
                    StreamError::decode(format!("number {n} does not fit a 64-bit value"))
                })?),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::List(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            serde_json::Value::Object(_) => {
                return Err(StreamError::decode(
                    "nested objects are not supported as cell values",
                ))
            }
        })
    }
}

/// One row-shaped view over a single index of a batch.
///
/// Keys keep insertion order: the `FieldSelection` order when one is set,
/// otherwise the batch's (sorted) column order. Equality ignores order.
pub type Record = IndexMap<String, Value>;

/// Dataset description returned by the `Info` handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Total number of records in the whole dataset.
    pub length: u64,
    /// Field names advertised by the server, possibly empty.
    pub fields: Vec<String>,
    /// Number of records the server encodes per batch, if it says.
    pub batch_size: Option<u32>,
}

impl Metadata {
    pub fn new(length: u64) -> Self {
        Self {
            length,
            ..Default::default()
        }
    }
}

/// A columnar chunk of records: field name to per-record values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    columns: BTreeMap<String, Vec<Value>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: BTreeMap<String, Vec<Value>>) -> Self {
        Self { columns }
    }

    /// Builder-style column insertion, mostly for tests and servers.
    #[must_use]
    pub fn with_column<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.insert_column(name, values.into_iter().map(Into::into).collect());
        self
    }

    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.columns.insert(name.into(), values);
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Returns `batch[field][index]`, or `None` if either is missing.
    pub fn get(&self, field: &str, index: usize) -> Option<&Value> {
        self.columns.get(field).and_then(|column| column.get(index))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows, taken as the length of the longest column.
    pub fn num_rows(&self) -> usize {
        self.columns.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn into_columns(self) -> BTreeMap<String, Vec<Value>> {
        self.columns
    }
}

/// Ordered set of field names restricting which columns are projected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    fields: Vec<String>,
}

impl FieldSelection {
    /// Creates a selection, dropping repeated names while keeping first-seen order.
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for field in fields {
            let field = field.into();
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        Self { fields: unique }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

impl From<Vec<String>> for FieldSelection {
    fn from(fields: Vec<String>) -> Self {
        Self::new(fields)
    }
}
