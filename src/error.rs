//! Error taxonomy for the pulse pipeline.
//!
//! Decoder failures never propagate as exceptions — they are tagged return
//! values (`registry::DecodeOutcome`). The types here cover the boundary
//! errors that *can* be propagated: source I/O, sink I/O, and decoder
//! configuration at registration time.

use thiserror::Error;

/// Errors from a sample source (hardware driver, file reader, …).
///
/// Source-level hiccups are expected to be retried with backoff by the
/// source implementation itself; only an unrecoverable condition should
/// surface here and terminate the pipeline.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("short read: expected up to {requested} samples, got {actual}")]
    ShortRead { requested: usize, actual: usize },

    #[error("source device disconnected: {0}")]
    Disconnected(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a sink (serializer, transport, …).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink queue full, record dropped (lost {lost_total} total)")]
    Backpressure { lost_total: u64 },

    #[error("sink closed: {0}")]
    Closed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors parsing a decoder's `configure(name, key, value)` parameter string.
///
/// Fatal only at startup/registration time; never raised mid-stream.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("unknown parameter key {key:?} for decoder {decoder:?}")]
    UnknownKey { decoder: String, key: String },

    #[error("invalid value {value:?} for key {key:?} of decoder {decoder:?}: {reason}")]
    InvalidValue {
        decoder: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("malformed parameter string {raw:?}: {reason}")]
    Malformed { raw: String, reason: String },

    #[error("unknown decoder {0:?}")]
    UnknownDecoder(String),
}
