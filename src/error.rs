use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Canonical error surface for the parameter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported {context} version {found} (expected {expected})")]
    UnsupportedVersion {
        context: &'static str,
        found: u8,
        expected: u8,
    },

    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: Cow<'static, str> },

    #[error("Truncated frame at offset {offset}")]
    TruncatedFrame { offset: u64 },

    #[error("Record of {size} bytes exceeds the limit of {limit} bytes")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("Parameters already exist for {key}")]
    DuplicateKey { key: String },

    #[error("{context} has no ID")]
    MissingId { context: &'static str },

    #[error("Record {id} is not visible after writing it")]
    ReadBackFailed { id: String },

    #[error("Invalid store configuration: {reason}")]
    InvalidConfig { reason: Cow<'static, str> },

    #[error("Not a valid parameter store type: {kind}")]
    UnknownStoreType { kind: String },

    #[error("Parameters {id} referenced by a parameter set were not found")]
    MissingParameters { id: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub(crate) fn malformed(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Whether a later read can clear this condition, e.g. once a concurrent
    /// writer finishes appending the frame that is currently cut off.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TruncatedFrame { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}
