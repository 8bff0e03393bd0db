//! Typed error taxonomy for the index and storage layers.
//!
//! Maps the source's exception-based control flow onto a single sum type per
//! layer instead of a class hierarchy.

use crate::types::Metric;
use thiserror::Error;

/// Errors surfaced by a [`crate::storage::StorageBackend`] implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record not found")]
    NotFound,

    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// Errors surfaced by an [`crate::index::Index`] implementation.
///
/// Storage failures bubble through as `StorageFailure`; per-vector failures
/// inside a batch operation never produce this error directly, they are
/// recorded as `false`/omitted entries in the batch's own result list.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index has not been initialized")]
    NotInitialized,

    #[error("index has not been trained or built")]
    NotTrained,

    #[error("metric {metric:?} is not supported by this index")]
    UnsupportedMetric { metric: Metric },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage failure: {0}")]
    StorageFailure(#[from] StorageError),

    #[error("training failed: {0}")]
    TrainingFailed(String),

    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
