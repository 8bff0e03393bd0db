// vectorlite - an embedded vector database
//
// Binds a pluggable ANN index (Flat, HNSW, IVF, LSH, Annoy) to a pluggable
// storage backend (Memory, Disk, Hybrid) behind a single Client facade.

pub mod client;
pub mod error;
pub mod index;
pub mod observability;
pub mod similarity;
pub mod storage;
pub mod types;

pub use client::Client;
pub use error::{IndexError, StorageError};
pub use index::{
    AnnoyConfig, AnnoyIndex, FlatConfig, FlatIndex, HnswConfig, HnswIndex, Index, IvfConfig,
    IvfIndex, LshConfig, LshIndex,
};
pub use observability::{init_logging, init_logging_with_level};
pub use storage::{DiskStorage, HybridStorage, MemoryStorage, StorageBackend};
pub use types::{Metadata, MetadataValue, Metric, Page, SearchResult, Vector, VectorId};
