//! # Error Kinds
//!
//! Central error type for the multio core, following §7 of the design: every
//! fallible core operation returns a `MultioError` so callers (the listener's
//! dispatch loop, the C ABI boundary) can match on kind and apply a failure
//! policy rather than just propagating an opaque `anyhow::Error`.
//!
//! Binaries and tests that don't need to discriminate on error kind can still
//! convert a `MultioError` into `anyhow::Error` with `?`, the same layering
//! the teacher's CLI front end uses over its library errors.

use thiserror::Error;

/// The kinds of failure the core can report, per spec §7.
#[derive(Debug, Error)]
pub enum MultioError {
    /// Malformed pipeline or unknown action/sink name. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure. Fatal for the affected endpoint.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Bad payload: empty, wrong precision, or mismatched size between
    /// correlated fields (e.g. u/v in Windspeed).
    #[error("field error: {0}")]
    FieldError(String),

    /// A typed metadata lookup failed: missing key or type mismatch.
    #[error("metadata missing or mistyped: {0}")]
    MetadataMissing(String),

    /// A sink failed to write, flush, or otherwise accept a message.
    #[error("sink failure: {0}")]
    SinkFailure(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The journal is inconsistent on read, or framing failed on write.
    #[error("corrupt journal: {0}")]
    CorruptJournal(String),

    /// `Metadata::get<T>` found the key with the wrong type, or it was absent.
    #[error("invalid field access: {0}")]
    InvalidField(String),

    /// Wraps a lower-level I/O failure so call sites don't need `From` noise
    /// at every `?`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MultioError>;

/// What the listener should do after a stage reports a failure (§7
/// Propagation). Configuration-driven per pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the error and drop the offending message; keep the pipeline alive.
    #[default]
    Continue,
    /// Log the error and trigger listener cancellation.
    Abort,
}

impl FailurePolicy {
    pub fn from_str_lenient(s: &str) -> Self {
        match s {
            "abort" => FailurePolicy::Abort,
            _ => FailurePolicy::Continue,
        }
    }
}
