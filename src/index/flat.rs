use super::{top_k_by_distance, Index, IndexStats};
use crate::error::{IndexError, Result};
use crate::storage::StorageBackend;
use crate::types::{check_dimension, IndexKind, Metadata, Metric, SearchResult, Vector, VectorId};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Brute-force exact search over a cached vector set.
///
/// Internal state: an append-only list of ids plus a concurrent
/// `{id -> vector}` cache. Search misses load from
/// storage into the cache and fall through `top_k_by_distance`'s bounded
/// max-heap.
pub struct FlatConfig {
    pub metric: Metric,
}

impl Default for FlatConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Cosine,
        }
    }
}

impl FlatConfig {
    pub fn validate(&self) -> Result<()> {
        if !IndexKind::Flat.supports(self.metric) {
            return Err(IndexError::UnsupportedMetric {
                metric: self.metric,
            });
        }
        Ok(())
    }
}

pub struct FlatIndex {
    config: FlatConfig,
    storage: RwLock<Option<Arc<dyn StorageBackend>>>,
    ids: RwLock<Vec<VectorId>>,
    cache: DashMap<VectorId, Vector>,
    dimension: RwLock<Option<usize>>,
    vector_count: AtomicUsize,
    closed: RwLock<bool>,
}

impl FlatIndex {
    pub fn new(config: FlatConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage: RwLock::new(None),
            ids: RwLock::new(Vec::new()),
            cache: DashMap::new(),
            dimension: RwLock::new(None),
            vector_count: AtomicUsize::new(0),
            closed: RwLock::new(false),
        })
    }

    fn storage(&self) -> Result<Arc<dyn StorageBackend>> {
        self.storage
            .read()
            .clone()
            .ok_or(IndexError::NotInitialized)
    }

    fn ensure_dimension(&self, vector: &Vector) -> Result<usize> {
        let mut dim_guard = self.dimension.write();
        match *dim_guard {
            Some(d) => {
                check_dimension(d, vector)?;
                Ok(d)
            }
            None => {
                *dim_guard = Some(vector.len());
                Ok(vector.len())
            }
        }
    }
}

impl Index for FlatIndex {
    fn initialize(&self, storage: Arc<dyn StorageBackend>) -> Result<()> {
        let existing = storage
            .list_vectors(None)
            .map_err(IndexError::StorageFailure)?;
        let mut ids = self.ids.write();
        for id in &existing {
            if let Some((vector, _)) = storage
                .retrieve_vector(id)
                .map_err(IndexError::StorageFailure)?
            {
                if self.dimension.read().is_none() {
                    *self.dimension.write() = Some(vector.len());
                }
                self.cache.insert(*id, vector);
            }
        }
        *ids = existing;
        self.vector_count.store(ids.len(), Ordering::SeqCst);
        *self.storage.write() = Some(storage);
        *self.closed.write() = false;
        Ok(())
    }

    fn insert(
        &self,
        vectors: Vec<Vector>,
        metadata: Vec<Option<Metadata>>,
    ) -> Result<Vec<VectorId>> {
        let storage = self.storage()?;
        let mut inserted = Vec::with_capacity(vectors.len());
        let mut ids_guard = self.ids.write();

        for (vector, meta) in vectors.into_iter().zip(metadata) {
            self.ensure_dimension(&vector)?;
            let id = VectorId::new();
            let stored = storage
                .store_vector(id, vector.clone(), meta)
                .map_err(IndexError::StorageFailure)?;
            if stored {
                self.cache.insert(id, vector);
                ids_guard.push(id);
                inserted.push(id);
            }
        }
        self.vector_count.store(ids_guard.len(), Ordering::SeqCst);
        Ok(inserted)
    }

    fn search(&self, query: &Vector, k: usize) -> Result<Vec<SearchResult>> {
        let storage = self.storage()?;
        if let Some(d) = *self.dimension.read() {
            check_dimension(d, query)?;
        }
        let ids: Vec<VectorId> = self.ids.read().clone();

        // warm the cache for any ids we haven't seen yet
        for id in &ids {
            if !self.cache.contains_key(id) {
                if let Some((vector, _)) = storage
                    .retrieve_vector(id)
                    .map_err(IndexError::StorageFailure)?
                {
                    self.cache.insert(*id, vector);
                }
            }
        }

        top_k_by_distance(storage.as_ref(), self.config.metric, query, ids, k)
    }

    fn delete(&self, ids: &[VectorId]) -> Result<bool> {
        let storage = self.storage()?;
        let mut ids_guard = self.ids.write();
        let mut all_found = true;
        for id in ids {
            let found = storage
                .delete_vector(id)
                .map_err(IndexError::StorageFailure)?;
            all_found &= found;
            if found {
                self.cache.remove(id);
                ids_guard.retain(|existing| existing != id);
            }
        }
        self.vector_count.store(ids_guard.len(), Ordering::SeqCst);
        Ok(all_found)
    }

    fn update(
        &self,
        id: &VectorId,
        vector: Option<Vector>,
        metadata: Option<Metadata>,
    ) -> Result<bool> {
        let storage = self.storage()?;
        if let Some(ref v) = vector {
            self.ensure_dimension(v)?;
        }
        let updated = storage
            .update_vector(id, vector.clone(), metadata)
            .map_err(IndexError::StorageFailure)?;
        if updated {
            if let Some(v) = vector {
                self.cache.insert(*id, v);
            } else if let Some((v, _)) = storage
                .retrieve_vector(id)
                .map_err(IndexError::StorageFailure)?
            {
                self.cache.insert(*id, v);
            }
        }
        Ok(updated)
    }

    fn get_stats(&self) -> IndexStats {
        let mut stats = IndexStats::new();
        stats.insert(
            "vector_count".to_string(),
            serde_json::json!(self.vector_count.load(Ordering::SeqCst)),
        );
        stats.insert(
            "dimension".to_string(),
            serde_json::json!(*self.dimension.read()),
        );
        stats.insert("metric".to_string(), serde_json::json!(format!("{:?}", self.config.metric)));
        stats
    }

    fn close(&self) -> Result<()> {
        *self.closed.write() = true;
        self.cache.clear();
        *self.ids.write() = Vec::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn fresh_index() -> FlatIndex {
        let index = FlatIndex::new(FlatConfig {
            metric: Metric::Cosine,
        })
        .unwrap();
        index.initialize(Arc::new(MemoryStorage::new())).unwrap();
        index
    }

    #[test]
    fn s1_flat_cosine_basis_vectors() {
        let index = fresh_index();
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        let metas = vec!["x", "y", "z"]
            .into_iter()
            .map(|axis| {
                Some(Metadata::from([(
                    "axis".to_string(),
                    crate::types::MetadataValue::String(axis.to_string()),
                )]))
            })
            .collect();
        index.insert(vectors, metas).unwrap();

        let results = index.search(&vec![1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].distance < 1e-6);
        let axis = match &results[0].metadata.as_ref().unwrap()["axis"] {
            crate::types::MetadataValue::String(s) => s.clone(),
            _ => panic!("expected string"),
        };
        assert_eq!(axis, "x");
    }

    #[test]
    fn s2_flat_euclidean_distances_in_order() {
        let index = FlatIndex::new(FlatConfig {
            metric: Metric::Euclidean,
        })
        .unwrap();
        index.initialize(Arc::new(MemoryStorage::new())).unwrap();
        index
            .insert(
                vec![vec![0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0], vec![3.0, 4.0, 0.0]],
                vec![None, None, None],
            )
            .unwrap();

        let results = index.search(&vec![0.0, 0.0, 0.0], 3).unwrap();
        let distances: Vec<f64> = results.iter().map(|r| r.distance).collect();
        assert_eq!(distances, vec![0.0, 1.0, 5.0]);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let index = fresh_index();
        index.insert(vec![vec![1.0, 2.0, 3.0]], vec![None]).unwrap();
        let err = index.insert(vec![vec![1.0, 2.0]], vec![None]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn delete_disjointness() {
        let index = fresh_index();
        let ids = index
            .insert(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]], vec![None, None])
            .unwrap();
        assert!(index.delete(&[ids[0]]).unwrap());
        let results = index.search(&vec![1.0, 0.0, 0.0], 2).unwrap();
        assert!(!results.iter().any(|r| r.id == ids[0]));
    }

    #[test]
    fn close_is_idempotent() {
        let index = fresh_index();
        index.close().unwrap();
        index.close().unwrap();
    }

    #[test]
    fn unsupported_metric_rejected_at_construction() {
        // Flat supports every metric, so construct a deliberately-invalid
        // config path is exercised via HNSW/LSH tests instead; this checks
        // that a supported metric does construct successfully.
        assert!(FlatIndex::new(FlatConfig {
            metric: Metric::Manhattan
        })
        .is_ok());
    }
}
