//! Core data model: vectors, ids, metadata, search results, and pagination.
//!
//! `VectorId` follows a validated-newtype idiom: it cannot be constructed
//! from a nil UUID, so a default-constructed id is never mistaken for
//! "absent".

use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A 128-bit random identifier rendered as its canonical UUID string.
///
/// Two [`VectorWithMetadata`] instances are equal iff their ids match,
/// regardless of vector contents or metadata — this is an explicit design
/// choice, not the derived struct equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VectorId(Uuid);

impl VectorId {
    /// Generate a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a canonical UUID string into an id.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for VectorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered sequence of 64-bit floats, fixed-length within one database
/// instance (the length of the first inserted vector becomes the
/// dimensionality for the life of the index).
pub type Vector = Vec<f64>;

pub(crate) fn check_dimension(expected: usize, v: &[f64]) -> Result<(), IndexError> {
    if v.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: v.len(),
        });
    }
    Ok(())
}

/// A tagged variant metadata value. Deliberately schemaless, modeled as a
/// tagged variant tree rather than a typed struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Map(Metadata),
    List(Vec<MetadataValue>),
}

/// A mapping from string key to tagged metadata value. Optional on a vector.
pub type Metadata = HashMap<String, MetadataValue>;

/// The triple stored by a [`crate::storage::StorageBackend`]: id, vector,
/// and optional metadata.
///
/// Vectors are defensively copied on store and retrieve; metadata may be
/// aliased (cloning a `HashMap` is already a value copy in Rust, so this is
/// automatic rather than something callers must opt into).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorWithMetadata {
    pub id: VectorId,
    pub vector: Vector,
    pub metadata: Option<Metadata>,
}

impl PartialEq for VectorWithMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for VectorWithMetadata {}

/// A single ranked search hit. Distances are ascending-best: smallest is
/// most similar. For dot-product rankings the distance field already holds
/// the negated dot product so the ascending-best convention holds uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: VectorId,
    pub distance: f64,
    pub metadata: Option<Metadata>,
}

/// One page of a paginated listing. Immutable once constructed.
///
/// Invariant: `has_more == false` implies `next_cursor.is_none()`;
/// `has_more == true` implies `next_cursor.is_some()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Vec<u8>>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<Vec<u8>>) -> Self {
        let has_more = next_cursor.is_some();
        Self {
            items,
            next_cursor,
            has_more,
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Closed enumeration of supported distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Cosine,
    Euclidean,
    DotProduct,
    Manhattan,
}

/// Which metrics an index variant supports:
/// HNSW supports {cosine, euclidean}; IVF, LSH, Annoy, Flat support the full
/// set except LSH excludes manhattan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Flat,
    Hnsw,
    Ivf,
    Lsh,
    Annoy,
}

impl IndexKind {
    pub fn supports(&self, metric: Metric) -> bool {
        match self {
            IndexKind::Flat | IndexKind::Ivf | IndexKind::Annoy => true,
            IndexKind::Hnsw => matches!(metric, Metric::Cosine | Metric::Euclidean),
            IndexKind::Lsh => !matches!(metric, Metric::Manhattan),
        }
    }
}
