//! `Index` — the common contract implemented by all five ANN variants.
//!
//! The source's `AbstractIndex` base class becomes a single trait plus five
//! concrete structs and a `Metric`/`IndexKind` tagged enum, per the design
//! note (inheritance hierarchy becomes traits plus tagged variants).
//! Every method takes `&self`; each concrete index manages its own interior
//! mutability (a `parking_lot::RwLock` around its graph/lists/buckets/trees)
//! so the locking discipline is enforced per-index
//! rather than by the trait.

mod annoy;
mod flat;
mod hnsw;
mod ivf;
mod lsh;

pub use annoy::{AnnoyConfig, AnnoyIndex};
pub use flat::{FlatConfig, FlatIndex};
pub use hnsw::{HnswConfig, HnswIndex};
pub use ivf::{IvfConfig, IvfIndex};
pub use lsh::{LshConfig, LshIndex};

use crate::error::{IndexError, Result};
use crate::storage::StorageBackend;
use crate::types::{Metadata, SearchResult, Vector, VectorId};
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Snapshot returned by `get_stats()`. Never fails, so it is a plain map
/// rather than a `Result`.
pub type IndexStats = std::collections::HashMap<String, serde_json::Value>;

pub trait Index: Send + Sync {
    /// Bind to a backend. A freshly-opened index rebuilds its internal
    /// structures from `storage.list_vectors` + per-id retrieval.
    fn initialize(&self, storage: Arc<dyn StorageBackend>) -> Result<()>;

    /// Write vectors to storage first; on success add their ids to the
    /// index's structures. Partial storage failures report only the ids
    /// that were actually stored.
    fn insert(&self, vectors: Vec<Vector>, metadata: Vec<Option<Metadata>>) -> Result<Vec<VectorId>>;

    /// At most `k` results, strictly ascending by distance. Safe to call
    /// concurrently with other searches.
    fn search(&self, query: &Vector, k: usize) -> Result<Vec<SearchResult>>;

    /// `true` iff every id was found and removed.
    fn delete(&self, ids: &[VectorId]) -> Result<bool>;

    /// Either/both of vector and metadata may be replaced.
    fn update(&self, id: &VectorId, vector: Option<Vector>, metadata: Option<Metadata>) -> Result<bool>;

    /// Semantically equivalent to sequential `search` calls but holding the
    /// index's lock across the whole batch.
    fn batch_search(&self, queries: &[Vector], k: usize) -> Result<Vec<Vec<SearchResult>>> {
        queries.iter().map(|q| self.search(q, k)).collect()
    }

    /// Semantically equivalent to sequential `update` calls but holding the
    /// index's lock across the whole batch.
    fn batch_update(
        &self,
        ids: &[VectorId],
        vectors: Vec<Option<Vector>>,
        metas: Vec<Option<Metadata>>,
    ) -> Result<Vec<bool>> {
        ids.iter()
            .zip(vectors)
            .zip(metas)
            .map(|((id, v), m)| self.update(id, v, m))
            .collect()
    }

    fn get_stats(&self) -> IndexStats;

    /// Idempotent; releases in-memory structures.
    fn close(&self) -> Result<()>;
}

/// An entry in the bounded max-heap used by every index's final scoring
/// step: bounded memory proportional to k, not N,
/// reused here instead of just in Flat since IVF/LSH/Annoy all finish with
/// the same exact-distance-then-top-k step over a candidate set.
#[derive(Debug, Clone, PartialEq)]
struct HeapEntry {
    distance: f64,
    sequence: u64,
    result: SearchResult,
}

impl Eq for HeapEntry {}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap on distance; ties broken by insertion order so the
        // farthest *and* most-recently-seen duplicate distance pops first,
        // preserving stable ascending order once drained and reversed.
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(self.sequence.cmp(&other.sequence))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Given a candidate id set, fetch exact vectors/metadata from storage,
/// compute the configured metric, and keep only the best `k` via a bounded
/// max-heap (poll when size exceeds k), then drain into ascending order.
/// Ties are broken by insertion order for stable ascending results.
fn top_k_by_distance(
    storage: &dyn StorageBackend,
    metric: crate::types::Metric,
    query: &Vector,
    candidates: impl IntoIterator<Item = VectorId>,
    k: usize,
) -> Result<Vec<SearchResult>> {
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
    let mut sequence = 0u64;

    for id in candidates {
        let Some((vector, metadata)) = storage
            .retrieve_vector(&id)
            .map_err(IndexError::StorageFailure)?
        else {
            continue; // reconciled away between candidate generation and fetch
        };
        let distance = crate::similarity::distance(metric, query, &vector);
        heap.push(HeapEntry {
            distance,
            sequence,
            result: SearchResult {
                id,
                distance,
                metadata,
            },
        });
        sequence += 1;
        if heap.len() > k {
            heap.pop();
        }
    }

    let mut results: Vec<HeapEntry> = heap.into_sorted_vec();
    // into_sorted_vec is ascending by Ord, i.e. ascending distance already
    // since HeapEntry's Ord matches distance directly (max-heap pops
    // largest last in sorted_vec's ascending output).
    results.truncate(k);
    Ok(results.into_iter().map(|e| e.result).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::Metric;

    #[test]
    fn top_k_by_distance_returns_ascending_order() {
        let storage = MemoryStorage::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let id = VectorId::new();
            storage
                .store_vector(id, vec![i as f64], None)
                .unwrap();
            ids.push(id);
        }
        let query = vec![0.0];
        let results = top_k_by_distance(&storage, Metric::Euclidean, &query, ids, 3).unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert_eq!(results[0].distance, 0.0);
    }
}
