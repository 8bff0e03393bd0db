use super::{Index, IndexStats};
use crate::error::{IndexError, Result};
use crate::storage::StorageBackend;
use crate::types::{check_dimension, Metadata, Metric, SearchResult, Vector, VectorId};
use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct IvfConfig {
    pub metric: Metric,
    pub num_clusters: usize,
    pub num_probes: usize,
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    pub random_seed: Option<u64>,
}

impl Default for IvfConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Euclidean,
            num_clusters: 100,
            num_probes: 10,
            max_iterations: 100,
            convergence_threshold: 1e-4,
            random_seed: None,
        }
    }
}

impl IvfConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_probes > self.num_clusters {
            return Err(IndexError::ConfigError(
                "num_probes must not exceed num_clusters".to_string(),
            ));
        }
        if self.num_clusters == 0 {
            return Err(IndexError::ConfigError(
                "num_clusters must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pure k-means training: seeding and parallel Lloyd iterations, per
/// Implemented with
/// `rayon`'s fold/reduce combinators, which give each worker its own
/// `sum`/`count` accumulator and a deterministic sequential combine step —
/// the idiomatic Rust shape of a thread-local-buffers-plus-combiner
/// design.
mod kmeans {
    use super::*;

    pub fn seed_plus_plus(
        vectors: &[Vector],
        k: usize,
        metric: Metric,
        rng: &mut StdRng,
    ) -> Vec<Vector> {
        let mut centroids = Vec::with_capacity(k);
        let first = rng.gen_range(0..vectors.len());
        centroids.push(vectors[first].clone());

        while centroids.len() < k {
            let weights: Vec<f64> = vectors
                .iter()
                .map(|v| {
                    centroids
                        .iter()
                        .map(|c| crate::similarity::distance(metric, v, c).powi(2))
                        .fold(f64::INFINITY, f64::min)
                })
                .collect();
            let total: f64 = weights.iter().sum();
            if total <= 0.0 {
                // all remaining vectors coincide with a chosen centroid
                let idx = rng.gen_range(0..vectors.len());
                centroids.push(vectors[idx].clone());
                continue;
            }
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = vectors.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target <= *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            centroids.push(vectors[chosen].clone());
        }
        centroids
    }

    /// One assignment+update pass. Returns (new_centroids, assignments,
    /// max_coordinate_shift, any_assignment_changed).
    pub fn lloyd_step(
        vectors: &[Vector],
        centroids: &[Vector],
        metric: Metric,
        previous_assignments: Option<&[usize]>,
        rng: &mut StdRng,
    ) -> (Vec<Vector>, Vec<usize>, f64, bool) {
        use rayon::prelude::*;

        let dim = centroids[0].len();
        let k = centroids.len();

        let assignments: Vec<usize> = vectors
            .par_iter()
            .map(|v| {
                centroids
                    .iter()
                    .enumerate()
                    .map(|(ci, c)| (ci, crate::similarity::distance(metric, v, c)))
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(ci, _)| ci)
                    .unwrap_or(0)
            })
            .collect();

        let changed = match previous_assignments {
            Some(prev) => prev != assignments.as_slice(),
            None => true,
        };

        // thread-local sum/count accumulators, combined sequentially
        let (sums, counts) = vectors
            .par_iter()
            .zip(assignments.par_iter())
            .fold(
                || (vec![vec![0.0_f64; dim]; k], vec![0usize; k]),
                |(mut sums, mut counts), (v, &ci)| {
                    for (s, x) in sums[ci].iter_mut().zip(v) {
                        *s += x;
                    }
                    counts[ci] += 1;
                    (sums, counts)
                },
            )
            .reduce(
                || (vec![vec![0.0_f64; dim]; k], vec![0usize; k]),
                |(mut sums_a, mut counts_a), (sums_b, counts_b)| {
                    for ci in 0..k {
                        for d in 0..dim {
                            sums_a[ci][d] += sums_b[ci][d];
                        }
                        counts_a[ci] += counts_b[ci];
                    }
                    (sums_a, counts_a)
                },
            );

        let mut new_centroids = Vec::with_capacity(k);
        let mut max_shift = 0.0_f64;
        for ci in 0..k {
            let new_centroid = if counts[ci] == 0 {
                // reinitialize empty clusters to a random training vector
                vectors[rng.gen_range(0..vectors.len())].clone()
            } else {
                sums[ci].iter().map(|s| s / counts[ci] as f64).collect()
            };
            let shift = new_centroid
                .iter()
                .zip(&centroids[ci])
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max);
            max_shift = max_shift.max(shift);
            new_centroids.push(new_centroid);
        }

        (new_centroids, assignments, max_shift, changed)
    }
}

struct IvfState {
    centroids: Vec<Vector>,
    inverted_lists: Vec<Vec<VectorId>>,
    trained: bool,
}

impl IvfState {
    fn empty() -> Self {
        Self {
            centroids: Vec::new(),
            inverted_lists: Vec::new(),
            trained: false,
        }
    }
}

/// Inverted-list index over k-means clusters with parallel training.
pub struct IvfIndex {
    config: IvfConfig,
    storage: RwLock<Option<Arc<dyn StorageBackend>>>,
    state: RwLock<IvfState>,
    dimension: RwLock<Option<usize>>,
}

impl IvfIndex {
    pub fn new(config: IvfConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage: RwLock::new(None),
            state: RwLock::new(IvfState::empty()),
            dimension: RwLock::new(None),
        })
    }

    fn storage(&self) -> Result<Arc<dyn StorageBackend>> {
        self.storage
            .read()
            .clone()
            .ok_or(IndexError::NotInitialized)
    }

    fn rng(&self) -> StdRng {
        match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Force a (re)train against every vector currently in storage. Callers
    /// use this to explicitly retrain after a batch of inserts rather than
    /// relying on the implicit auto-train that fires on the first `insert`
    /// when the index is not yet trained.
    pub fn train(&self) -> Result<()> {
        let storage = self.storage()?;
        let existing = storage
            .list_vectors(None)
            .map_err(IndexError::StorageFailure)?;
        let mut training_set = Vec::with_capacity(existing.len());
        for id in existing {
            if let Some((vector, _)) = storage
                .retrieve_vector(&id)
                .map_err(IndexError::StorageFailure)?
            {
                training_set.push((id, vector));
            }
        }
        self.train_on(&training_set)
    }

    /// Train centroids against `vectors` and rebuild the inverted lists by
    /// reassigning every id currently known (ids supplied by the caller).
    fn train_on(&self, training_set: &[(VectorId, Vector)]) -> Result<()> {
        if training_set.is_empty() {
            return Err(IndexError::TrainingFailed(
                "zero training vectors".to_string(),
            ));
        }
        let mut num_clusters = self.config.num_clusters;
        if training_set.len() < num_clusters {
            warn!(
                "training set size {} < num_clusters {}, reducing num_clusters",
                training_set.len(),
                num_clusters
            );
            num_clusters = training_set.len();
        }

        let vectors: Vec<Vector> = training_set.iter().map(|(_, v)| v.clone()).collect();
        let mut rng = self.rng();
        let mut centroids = kmeans::seed_plus_plus(&vectors, num_clusters, self.config.metric, &mut rng);

        let mut assignments: Option<Vec<usize>> = None;
        for _ in 0..self.config.max_iterations {
            let (new_centroids, new_assignments, max_shift, changed) =
                kmeans::lloyd_step(&vectors, &centroids, self.config.metric, assignments.as_deref(), &mut rng);
            centroids = new_centroids;
            assignments = Some(new_assignments);
            if !changed || max_shift < self.config.convergence_threshold {
                break;
            }
        }

        let assignments = assignments.unwrap();
        let mut inverted_lists = vec![Vec::new(); num_clusters];
        for ((id, _), cluster) in training_set.iter().zip(assignments) {
            inverted_lists[cluster].push(*id);
        }

        let mut state = self.state.write();
        state.centroids = centroids;
        state.inverted_lists = inverted_lists;
        state.trained = true;
        Ok(())
    }

    fn nearest_centroid(&self, state: &IvfState, vector: &Vector) -> usize {
        state
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, crate::similarity::distance(self.config.metric, vector, c)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

impl Index for IvfIndex {
    fn initialize(&self, storage: Arc<dyn StorageBackend>) -> Result<()> {
        *self.state.write() = IvfState::empty();
        *self.storage.write() = Some(storage.clone());
        let existing = storage
            .list_vectors(None)
            .map_err(IndexError::StorageFailure)?;
        if !existing.is_empty() {
            let mut training_set = Vec::with_capacity(existing.len());
            for id in existing {
                if let Some((vector, _)) = storage
                    .retrieve_vector(&id)
                    .map_err(IndexError::StorageFailure)?
                {
                    if self.dimension.read().is_none() {
                        *self.dimension.write() = Some(vector.len());
                    }
                    training_set.push((id, vector));
                }
            }
            self.train_on(&training_set)?;
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
        let mut batch = Vec::with_capacity(vectors.len());

        for (vector, meta) in vectors.into_iter().zip(metadata) {
            {
                let mut dim_guard = self.dimension.write();
                match *dim_guard {
                    Some(d) => check_dimension(d, &vector)?,
                    None => *dim_guard = Some(vector.len()),
                }
            }
            let id = VectorId::new();
            let stored = storage
                .store_vector(id, vector.clone(), meta)
                .map_err(IndexError::StorageFailure)?;
            if stored {
                batch.push((id, vector));
                inserted.push(id);
            }
        }

        let already_trained = self.state.read().trained;
        if !already_trained {
            // auto-train on the inserted batch
            self.train_on(&batch)?;
        } else {
            let mut state = self.state.write();
            for (id, vector) in &batch {
                let cluster = self.nearest_centroid(&state, vector);
                state.inverted_lists[cluster].push(*id);
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
        if !state.trained {
            return Err(IndexError::NotTrained);
        }

        let mut ranked: Vec<(f64, usize)> = state
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (crate::similarity::distance(self.config.metric, query, c), i))
            .collect();
        ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut candidates = Vec::new();
        for (_, cluster) in ranked.into_iter().take(self.config.num_probes) {
            candidates.extend(state.inverted_lists[cluster].iter().copied());
        }
        drop(state);

        super::top_k_by_distance(storage.as_ref(), self.config.metric, query, candidates, k)
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
                for list in state.inverted_lists.iter_mut() {
                    list.retain(|existing| existing != id);
                }
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
            if let Some(new_vector) = vector {
                let mut state = self.state.write();
                if state.trained {
                    for list in state.inverted_lists.iter_mut() {
                        list.retain(|existing| existing != id);
                    }
                    let cluster = self.nearest_centroid(&state, &new_vector);
                    state.inverted_lists[cluster].push(*id);
                }
            }
        }
        Ok(updated)
    }

    fn get_stats(&self) -> IndexStats {
        // Read lock only, held just long enough to clone small summary
        // counts: cluster_stats tolerates staleness under
        // concurrent mutation, so no stronger guarantee is attempted here.
        let state = self.state.read();
        let cluster_stats: HashMap<String, usize> = state
            .inverted_lists
            .iter()
            .enumerate()
            .map(|(i, list)| (i.to_string(), list.len()))
            .collect();
        let vector_count: usize = state.inverted_lists.iter().map(|l| l.len()).sum();

        let mut stats = IndexStats::new();
        stats.insert("vector_count".to_string(), serde_json::json!(vector_count));
        stats.insert("dimension".to_string(), serde_json::json!(*self.dimension.read()));
        stats.insert("trained".to_string(), serde_json::json!(state.trained));
        stats.insert("num_clusters".to_string(), serde_json::json!(state.centroids.len()));
        stats.insert("cluster_stats".to_string(), serde_json::json!(cluster_stats));
        stats
    }

    fn close(&self) -> Result<()> {
        *self.state.write() = IvfState::empty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use rand::SeedableRng;

    #[test]
    fn s4_ivf_training_and_probe() {
        let config = IvfConfig {
            metric: Metric::Euclidean,
            num_clusters: 10,
            num_probes: 3,
            random_seed: Some(42),
            ..Default::default()
        };
        let index = IvfIndex::new(config).unwrap();
        index.initialize(Arc::new(MemoryStorage::new())).unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let vectors: Vec<Vector> = (0..100)
            .map(|_| (0..64).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        let ids = index.insert(vectors.clone(), vec![None; 100]).unwrap();

        let results = index.search(&vectors[0], 10).unwrap();
        assert!(results.iter().any(|r| r.id == ids[0] && r.distance < 0.01));
    }

    #[test]
    fn explicit_train_rebuilds_clusters_from_all_stored_vectors() {
        let config = IvfConfig {
            num_clusters: 5,
            num_probes: 2,
            random_seed: Some(9),
            ..Default::default()
        };
        let index = IvfIndex::new(config).unwrap();
        index.initialize(Arc::new(MemoryStorage::new())).unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let vectors: Vec<Vector> = (0..30)
            .map(|_| (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        index.insert(vectors, vec![None; 30]).unwrap();

        index.train().unwrap();
        let stats = index.get_stats();
        assert_eq!(stats["trained"], serde_json::json!(true));
        assert_eq!(stats["num_clusters"], serde_json::json!(5));
    }

    #[test]
    fn search_before_train_fails() {
        let index = IvfIndex::new(IvfConfig::default()).unwrap();
        index.initialize(Arc::new(MemoryStorage::new())).unwrap();
        let err = index.search(&vec![0.0; 4], 1).unwrap_err();
        assert!(matches!(err, IndexError::NotTrained));
    }

    #[test]
    fn config_rejects_more_probes_than_clusters() {
        let err = IvfIndex::new(IvfConfig {
            num_clusters: 2,
            num_probes: 5,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, IndexError::ConfigError(_)));
    }

    #[test]
    fn small_training_set_reduces_cluster_count_instead_of_failing() {
        let config = IvfConfig {
            num_clusters: 50,
            num_probes: 1,
            random_seed: Some(1),
            ..Default::default()
        };
        let index = IvfIndex::new(config).unwrap();
        index.initialize(Arc::new(MemoryStorage::new())).unwrap();
        index
            .insert(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]], vec![None; 3])
            .unwrap();
        let stats = index.get_stats();
        assert!(stats["num_clusters"].as_u64().unwrap() <= 3);
    }
}
