use super::{top_k_by_distance, Index, IndexStats};
use crate::error::{IndexError, Result};
use crate::storage::StorageBackend;
use crate::types::{check_dimension, IndexKind, Metadata, Metric, SearchResult, Vector, VectorId};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct LshConfig {
    pub metric: Metric,
    pub num_tables: usize,
    pub num_hash_bits: usize,
    pub bucket_width: f64,
    pub random_seed: Option<u64>,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Cosine,
            num_tables: 5,
            num_hash_bits: 8,
            bucket_width: 4.0,
            random_seed: None,
        }
    }
}

impl LshConfig {
    pub fn validate(&self) -> Result<()> {
        if !IndexKind::Lsh.supports(self.metric) {
            return Err(IndexError::UnsupportedMetric {
                metric: self.metric,
            });
        }
        if self.num_tables == 0 || self.num_hash_bits == 0 {
            return Err(IndexError::ConfigError(
                "num_tables and num_hash_bits must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One hash function: a random projection plus, for Euclidean hashing, an
/// offset so `floor((x . projection + offset) / bucket_width) mod 2`
/// matches a p-stable hashing scheme. Cosine hashing only needs
/// the projection's sign, so `offset`/`bucket_width` are unused there.
#[derive(Clone)]
struct HashFunction {
    projection: Vector,
    offset: f64,
    bucket_width: f64,
}

impl HashFunction {
    fn bit(&self, metric: Metric, vector: &Vector) -> bool {
        let dot: f64 = vector.iter().zip(&self.projection).map(|(a, b)| a * b).sum();
        match metric {
            Metric::Euclidean => {
                let bucket = ((dot + self.offset) / self.bucket_width).floor() as i64;
                bucket.rem_euclid(2) == 1
            }
            _ => dot > 0.0,
        }
    }
}

struct LshState {
    hash_fns: Vec<Vec<HashFunction>>, // [table][bit]
    tables: Vec<HashMap<u64, HashSet<VectorId>>>, // [table] -> code -> ids
    codes: HashMap<VectorId, Vec<u64>>, // id -> per-table code, for O(num_tables) removal
    initialized_hashing: bool,
}

impl LshState {
    fn empty() -> Self {
        Self {
            hash_fns: Vec::new(),
            tables: Vec::new(),
            codes: HashMap::new(),
            initialized_hashing: false,
        }
    }
}

pub struct LshIndex {
    config: LshConfig,
    storage: RwLock<Option<Arc<dyn StorageBackend>>>,
    state: RwLock<LshState>,
    dimension: RwLock<Option<usize>>,
}

impl LshIndex {
    pub fn new(config: LshConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage: RwLock::new(None),
            state: RwLock::new(LshState::empty()),
            dimension: RwLock::new(None),
        })
    }

    fn storage(&self) -> Result<Arc<dyn StorageBackend>> {
        self.storage
            .read()
            .clone()
            .ok_or(IndexError::NotInitialized)
    }

    fn setup_hashing(&self, state: &mut LshState, dimension: usize, rng: &mut StdRng) {
        state.hash_fns = (0..self.config.num_tables)
            .map(|_| {
                (0..self.config.num_hash_bits)
                    .map(|_| {
                        let mut projection: Vector = (0..dimension)
                            .map(|_| StandardNormal.sample(rng))
                            .collect();
                        if matches!(self.config.metric, Metric::Cosine | Metric::DotProduct) {
                            let norm: f64 = projection.iter().map(|v| v * v).sum::<f64>().sqrt();
                            if norm > 0.0 {
                                for v in &mut projection {
                                    *v /= norm;
                                }
                            }
                        }
                        let offset = rng.gen_range(0.0..self.config.bucket_width);
                        HashFunction {
                            projection,
                            offset,
                            bucket_width: self.config.bucket_width,
                        }
                    })
                    .collect()
            })
            .collect();
        state.tables = vec![HashMap::new(); self.config.num_tables];
        state.initialized_hashing = true;
    }

    fn hash_code(&self, state: &LshState, table: usize, vector: &Vector) -> u64 {
        let mut code: u64 = 0;
        for (bit_idx, hash_fn) in state.hash_fns[table].iter().enumerate() {
            if hash_fn.bit(self.config.metric, vector) {
                code |= 1 << bit_idx;
            }
        }
        code
    }

    fn insert_into_buckets(&self, state: &mut LshState, id: VectorId, vector: &Vector) {
        let mut codes = Vec::with_capacity(self.config.num_tables);
        for table in 0..self.config.num_tables {
            let code = self.hash_code(state, table, vector);
            state.tables[table].entry(code).or_default().insert(id);
            codes.push(code);
        }
        state.codes.insert(id, codes);
    }

    fn remove_from_buckets(&self, state: &mut LshState, id: &VectorId) {
        if let Some(codes) = state.codes.remove(id) {
            for (table, code) in codes.into_iter().enumerate() {
                if let Some(bucket) = state.tables[table].get_mut(&code) {
                    bucket.remove(id);
                    if bucket.is_empty() {
                        state.tables[table].remove(&code);
                    }
                }
            }
        }
    }

    fn rng(&self) -> StdRng {
        match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Index for LshIndex {
    fn initialize(&self, storage: Arc<dyn StorageBackend>) -> Result<()> {
        *self.state.write() = LshState::empty();
        *self.storage.write() = Some(storage.clone());
        let existing = storage
            .list_vectors(None)
            .map_err(IndexError::StorageFailure)?;
        let mut rng = self.rng();
        let mut state = self.state.write();
        for id in existing {
            if let Some((vector, _)) = storage
                .retrieve_vector(&id)
                .map_err(IndexError::StorageFailure)?
            {
                if self.dimension.read().is_none() {
                    *self.dimension.write() = Some(vector.len());
                }
                if !state.initialized_hashing {
                    self.setup_hashing(&mut state, vector.len(), &mut rng);
                }
                self.insert_into_buckets(&mut state, id, &vector);
            }
        }
        Ok(())
    }

    fn insert(
        &self,
        vectors: Vec<Vector>,
        metadata: Vec<Option<Metadata>>,
    ) -> Result<Vec<VectorId>> {
        let storage = self.storage()?;
        let mut inserted = Vec::with_capacity(vectors.len());
        let mut rng = self.rng();
        let mut state = self.state.write();

        for (vector, meta) in vectors.into_iter().zip(metadata) {
            {
                let mut dim_guard = self.dimension.write();
                match *dim_guard {
                    Some(d) => check_dimension(d, &vector)?,
                    None => *dim_guard = Some(vector.len()),
                }
            }
            if !state.initialized_hashing {
                self.setup_hashing(&mut state, vector.len(), &mut rng);
            }
            let id = VectorId::new();
            let stored = storage
                .store_vector(id, vector.clone(), meta)
                .map_err(IndexError::StorageFailure)?;
            if stored {
                self.insert_into_buckets(&mut state, id, &vector);
                inserted.push(id);
            }
        }
        Ok(inserted)
    }

    fn search(&self, query: &Vector, k: usize) -> Result<Vec<SearchResult>> {
        let storage = self.storage()?;
        if let Some(d) = *self.dimension.read() {
            check_dimension(d, query)?;
        }
        let state = self.state.read();
        if !state.initialized_hashing {
            return Ok(Vec::new());
        }
        let mut candidates: HashSet<VectorId> = HashSet::new();
        for table in 0..self.config.num_tables {
            let code = self.hash_code(&state, table, query);
            if let Some(bucket) = state.tables[table].get(&code) {
                candidates.extend(bucket.iter().copied());
            }
        }
        drop(state);
        top_k_by_distance(storage.as_ref(), self.config.metric, query, candidates, k)
    }

    fn delete(&self, ids: &[VectorId]) -> Result<bool> {
        let storage = self.storage()?;
        let mut state = self.state.write();
        let mut all_found = true;
        for id in ids {
            let found = storage
                .delete_vector(id)
                .map_err(IndexError::StorageFailure)?;
            all_found &= found;
            if found {
                self.remove_from_buckets(&mut state, id);
            }
        }
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
            if let Some(d) = *self.dimension.read() {
                check_dimension(d, v)?;
            }
        }
        let updated = storage
            .update_vector(id, vector.clone(), metadata)
            .map_err(IndexError::StorageFailure)?;
        if updated {
            match vector {
                // A vector update moves the id to whatever buckets its new
                // hash lands in.
                Some(new_vector) => {
                    let mut state = self.state.write();
                    self.remove_from_buckets(&mut state, id);
                    self.insert_into_buckets(&mut state, *id, &new_vector);
                }
                // Metadata-only update: the source drops the id from every
                // bucket here and never reinserts it, silently making it
                // unreachable from search while it remains in storage. This
                // deliberately does not reproduce that bug: a None vector
                // leaves bucket membership untouched.
                None => {}
            }
        }
        Ok(updated)
    }

    fn get_stats(&self) -> IndexStats {
        let state = self.state.read();
        let bucket_count: usize = state.tables.iter().map(|t| t.len()).sum();
        let mut stats = IndexStats::new();
        stats.insert("vector_count".to_string(), serde_json::json!(state.codes.len()));
        stats.insert("dimension".to_string(), serde_json::json!(*self.dimension.read()));
        stats.insert("num_tables".to_string(), serde_json::json!(self.config.num_tables));
        stats.insert("num_hash_bits".to_string(), serde_json::json!(self.config.num_hash_bits));
        stats.insert("bucket_count".to_string(), serde_json::json!(bucket_count));
        stats
    }

    fn close(&self) -> Result<()> {
        *self.state.write() = LshState::empty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn fresh_index(metric: Metric) -> LshIndex {
        let index = LshIndex::new(LshConfig {
            metric,
            random_seed: Some(7),
            ..Default::default()
        })
        .unwrap();
        index.initialize(Arc::new(MemoryStorage::new())).unwrap();
        index
    }

    #[test]
    fn euclidean_bit_actually_uses_configured_bucket_width() {
        let narrow = HashFunction {
            projection: vec![1.0, 0.0],
            offset: 0.5,
            bucket_width: 1.0,
        };
        let wide = HashFunction {
            projection: vec![1.0, 0.0],
            offset: 0.5,
            bucket_width: 100.0,
        };
        // dot = 150.0, offset = 0.5: bucket_width=1.0 buckets at 150 (even,
        // bit 0), bucket_width=100.0 buckets at 1 (odd, bit 1) — the two
        // configs must disagree, which only holds if `bit` actually divides
        // by the configured width instead of a fixed constant.
        let vector = vec![150.0, 0.0];
        assert_ne!(
            narrow.bit(Metric::Euclidean, &vector),
            wide.bit(Metric::Euclidean, &vector)
        );
    }

    #[test]
    fn lsh_excludes_manhattan() {
        let err = LshIndex::new(LshConfig {
            metric: Metric::Manhattan,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedMetric { .. }));
    }

    #[test]
    fn metadata_only_update_preserves_bucket_membership() {
        let index = fresh_index(Metric::Cosine);
        let ids = index
            .insert(vec![vec![1.0, 0.0, 0.0, 0.0]], vec![None])
            .unwrap();
        index
            .update(
                &ids[0],
                None,
                Some(Metadata::from([(
                    "tag".to_string(),
                    crate::types::MetadataValue::String("updated".to_string()),
                )])),
            )
            .unwrap();
        let results = index.search(&vec![1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert!(results.iter().any(|r| r.id == ids[0]));
    }

    #[test]
    fn vector_update_moves_bucket_membership() {
        let index = fresh_index(Metric::Euclidean);
        let ids = index
            .insert(vec![vec![0.0, 0.0, 0.0, 0.0]], vec![None])
            .unwrap();
        index
            .update(&ids[0], Some(vec![100.0, 100.0, 100.0, 100.0]), None)
            .unwrap();
        let state = index.state.read();
        assert!(state.codes.contains_key(&ids[0]));
    }

    #[test]
    fn delete_removes_from_every_table() {
        let index = fresh_index(Metric::Cosine);
        let ids = index
            .insert(vec![vec![1.0, 0.0, 0.0, 0.0]], vec![None])
            .unwrap();
        index.delete(&[ids[0]]).unwrap();
        let state = index.state.read();
        assert!(!state.codes.contains_key(&ids[0]));
        for table in &state.tables {
            for bucket in table.values() {
                assert!(!bucket.contains(&ids[0]));
            }
        }
    }
}
