// rust/stream-core/src/config.rs

//! Configuration management for remote dataset streaming.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::codec::EndOfStreamMode;
use crate::dataset::{FieldSelection, DEFAULT_MAXSIZE};
use crate::error::{Result, StreamError};
use crate::transport::TransportKind;

// Top-level streaming configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub connection: ConnectionConfig,
    pub stream: StreamOptions,
}

/// How to reach the dataset server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server address: "tcp://host:port", "host:port" or "ipc:///path".
    pub address: String,
    /// Wire transport. `ipc://` servers speaking ZeroMQ need `zmq`.
    pub transport: TransportKind,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read timeout for each reply in milliseconds (0 waits forever).
    pub request_timeout_ms: u64,
    /// Largest reply frame accepted, in bytes.
    pub max_frame_bytes: usize,
}

/// Prefetching and record projection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    // Records consumed from each popped batch.
    pub batch_size: usize,
    // Optional field selection; all batch fields when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    // Capacity of the prefetch queue, in batches.
    pub maxsize: usize,
    // How the server signals end-of-stream.
    pub end_of_stream: EndOfStreamMode,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: "tcp://127.0.0.1:5555".to_string(),
            transport: TransportKind::Framed,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            max_frame_bytes: 256 * 1024 * 1024, // 256 MiB
        }
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            fields: None,
            maxsize: DEFAULT_MAXSIZE,
            end_of_stream: EndOfStreamMode::Tagged,
        }
    }
}

impl StreamOptions {
    /// The configured field list as a `FieldSelection`.
    pub fn field_selection(&self) -> Option<FieldSelection> {
        self.fields.clone().map(FieldSelection::from)
    }
}

impl FromStr for StreamConfig {
    type Err = StreamError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| StreamError::config_with_source("failed to parse TOML config", e))
    }
}

impl StreamConfig {
    /// Creates a configuration pointing at `address`, with defaults elsewhere.
    pub fn for_address(address: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.connection.address = address.into();
        config
    }

    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamError::config_with_source(
                format!("failed to read config file '{}'", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `RDS_` and use underscores
    // to separate nested fields. For example:
    // - `RDS_CONNECTION_ADDRESS` overrides `connection.address`
    // - `RDS_STREAM_BATCH_SIZE` overrides `stream.batch_size`
    // - `RDS_STREAM_FIELDS` overrides `stream.fields` (comma separated)
    // - `RDS_STREAM_END_OF_STREAM` overrides `stream.end_of_stream`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Connection overrides
        if let Ok(val) = std::env::var("RDS_CONNECTION_ADDRESS") {
            self.connection.address = val;
        }
        if let Ok(val) = std::env::var("RDS_CONNECTION_TRANSPORT") {
            if let Ok(v) = val.parse() {
                self.connection.transport = v;
            }
        }
        if let Ok(val) = std::env::var("RDS_CONNECTION_CONNECT_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.connection.connect_timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("RDS_CONNECTION_REQUEST_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.connection.request_timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("RDS_CONNECTION_MAX_FRAME_BYTES") {
            if let Ok(v) = val.parse() {
                self.connection.max_frame_bytes = v;
            }
        }

        // Stream overrides
        if let Ok(val) = std::env::var("RDS_STREAM_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.stream.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("RDS_STREAM_FIELDS") {
            let fields: Vec<String> = val
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
            self.stream.fields = if fields.is_empty() { None } else { Some(fields) };
        }
        if let Ok(val) = std::env::var("RDS_STREAM_MAXSIZE") {
            if let Ok(v) = val.parse() {
                self.stream.maxsize = v;
            }
        }
        if let Ok(val) = std::env::var("RDS_STREAM_END_OF_STREAM") {
            if let Ok(v) = val.parse() {
                self.stream.end_of_stream = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        // Connection validation
        if self.connection.address.trim().is_empty() {
            return Err(StreamError::config("connection.address must not be empty"));
        }
        if !self.connection.transport.is_available() {
            return Err(StreamError::config(format!(
                "connection.transport '{}' is not compiled in; enable the `{}` feature",
                self.connection.transport, self.connection.transport
            )));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(StreamError::config(
                "connection.connect_timeout_ms must be greater than 0",
            ));
        }
        if self.connection.max_frame_bytes < 8 {
            return Err(StreamError::config(
                "connection.max_frame_bytes must be at least 8",
            ));
        }

        // Stream validation
        if self.stream.batch_size == 0 {
            return Err(StreamError::config(
                "stream.batch_size must be greater than 0",
            ));
        }
        if self.stream.maxsize == 0 {
            return Err(StreamError::config("stream.maxsize must be greater than 0"));
        }
        if let Some(fields) = &self.stream.fields {
            if fields.is_empty() {
                return Err(StreamError::config(
                    "stream.fields must not be empty when set",
                ));
            }
            if fields.iter().any(|f| f.is_empty()) {
                return Err(StreamError::config(
                    "stream.fields must not contain empty names",
                ));
            }
            for (i, field) in fields.iter().enumerate() {
                if fields[..i].contains(field) {
                    return Err(StreamError::config(format!(
                        "stream.fields contains duplicate field '{field}'"
                    )));
                }
            }
        }

        Ok(())
    }
}
