use super::{top_k_by_distance, Index, IndexStats};
use crate::error::{IndexError, Result};
use crate::storage::StorageBackend;
use crate::types::{check_dimension, Metadata, Metric, SearchResult, Vector, VectorId};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct AnnoyConfig {
    pub metric: Metric,
    pub num_trees: usize,
    pub max_leaf_size: usize,
    pub search_k: Option<usize>,
    pub random_seed: Option<u64>,
}

impl Default for AnnoyConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Euclidean,
            num_trees: 10,
            max_leaf_size: 10,
            search_k: None,
            random_seed: None,
        }
    }
}

impl AnnoyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 || self.max_leaf_size == 0 {
            return Err(IndexError::ConfigError(
                "num_trees and max_leaf_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    fn effective_search_k(&self) -> usize {
        self.search_k.unwrap_or(self.num_trees * self.max_leaf_size)
    }
}

enum Node {
    Leaf { ids: Vec<VectorId> },
    Split {
        hyperplane: Vector,
        offset: f64,
        left: usize,
        right: usize,
    },
}

struct Tree {
    nodes: Vec<Node>,
    root: usize,
}

struct AnnoyState {
    vectors: std::collections::HashMap<VectorId, Vector>,
    tombstones: HashSet<VectorId>,
    trees: Vec<Tree>,
    dirty: bool,
}

impl AnnoyState {
    fn empty() -> Self {
        Self {
            vectors: std::collections::HashMap::new(),
            tombstones: HashSet::new(),
            trees: Vec::new(),
            dirty: true,
        }
    }

    fn live_ids(&self) -> Vec<VectorId> {
        self.vectors
            .keys()
            .filter(|id| !self.tombstones.contains(*id))
            .copied()
            .collect()
    }
}

/// Random-hyperplane forest. Each tree recursively splits its id set by a
/// random hyperplane through two sampled points until a partition is small
/// enough to become a leaf.
fn build_tree(
    ids: &[VectorId],
    vectors: &std::collections::HashMap<VectorId, Vector>,
    max_leaf_size: usize,
    rng: &mut StdRng,
) -> Tree {
    let mut nodes = Vec::new();
    let root = build_node(ids, vectors, max_leaf_size, rng, &mut nodes);
    Tree { nodes, root }
}

fn build_node(
    ids: &[VectorId],
    vectors: &std::collections::HashMap<VectorId, Vector>,
    max_leaf_size: usize,
    rng: &mut StdRng,
    nodes: &mut Vec<Node>,
) -> usize {
    if ids.len() <= max_leaf_size {
        nodes.push(Node::Leaf { ids: ids.to_vec() });
        return nodes.len() - 1;
    }

    let a = &vectors[&ids[rng.gen_range(0..ids.len())]];
    let b = &vectors[&ids[rng.gen_range(0..ids.len())]];
    let hyperplane: Vector = a.iter().zip(b).map(|(x, y)| x - y).collect();
    let midpoint: Vector = a.iter().zip(b).map(|(x, y)| (x + y) / 2.0).collect();
    let offset: f64 = hyperplane.iter().zip(&midpoint).map(|(h, m)| h * m).sum();

    let mut left_ids = Vec::new();
    let mut right_ids = Vec::new();
    for id in ids {
        let v = &vectors[id];
        let side: f64 = hyperplane.iter().zip(v).map(|(h, x)| h * x).sum::<f64>() - offset;
        if side >= 0.0 {
            left_ids.push(*id);
        } else {
            right_ids.push(*id);
        }
    }

    // degenerate split (every id on one side): fall back to a leaf rather
    // than recursing forever.
    if left_ids.is_empty() || right_ids.is_empty() {
        nodes.push(Node::Leaf { ids: ids.to_vec() });
        return nodes.len() - 1;
    }

    let left = build_node(&left_ids, vectors, max_leaf_size, rng, nodes);
    let right = build_node(&right_ids, vectors, max_leaf_size, rng, nodes);
    nodes.push(Node::Split {
        hyperplane,
        offset,
        left,
        right,
    });
    nodes.len() - 1
}

/// Priority-free traversal collecting at least `search_k` candidate ids by
/// always descending into both branches when the query is within margin of
/// the hyperplane, otherwise the near branch first.
fn collect_candidates(tree: &Tree, query: &Vector, search_k: usize) -> Vec<VectorId> {
    let mut candidates = Vec::new();
    let mut queue: VecDeque<usize> = VecDeque::new();
    queue.push_back(tree.root);

    while let Some(node_idx) = queue.pop_front() {
        if candidates.len() >= search_k {
            break;
        }
        match &tree.nodes[node_idx] {
            Node::Leaf { ids } => candidates.extend(ids.iter().copied()),
            Node::Split {
                hyperplane,
                offset,
                left,
                right,
            } => {
                let side: f64 =
                    hyperplane.iter().zip(query).map(|(h, x)| h * x).sum::<f64>() - offset;
                if side >= 0.0 {
                    queue.push_back(*left);
                    queue.push_back(*right);
                } else {
                    queue.push_back(*right);
                    queue.push_back(*left);
                }
            }
        }
    }
    candidates
}

pub struct AnnoyIndex {
    config: AnnoyConfig,
    storage: RwLock<Option<Arc<dyn StorageBackend>>>,
    state: RwLock<AnnoyState>,
    dimension: RwLock<Option<usize>>,
}

impl AnnoyIndex {
    pub fn new(config: AnnoyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage: RwLock::new(None),
            state: RwLock::new(AnnoyState::empty()),
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

    /// Force a tree rebuild now rather than waiting for the next `search`
    /// to trigger one lazily. Callers that want predictable latency after a
    /// burst of inserts call this explicitly; `search` still auto-rebuilds
    /// if it finds the forest dirty.
    pub fn build(&self) -> Result<()> {
        self.storage()?;
        let mut state = self.state.write();
        self.rebuild(&mut state);
        Ok(())
    }

    /// Rebuild all trees from the current live id set, dropping tombstoned
    /// ids so they stop being candidates for every future search.
    fn rebuild(&self, state: &mut AnnoyState) {
        let live_ids = state.live_ids();
        let mut rng = self.rng();
        state.trees = (0..self.config.num_trees)
            .map(|_| build_tree(&live_ids, &state.vectors, self.config.max_leaf_size, &mut rng))
            .collect();
        state.tombstones.clear();
        state.vectors.retain(|id, _| live_ids.contains(id));
        state.dirty = false;
    }
}

impl Index for AnnoyIndex {
    fn initialize(&self, storage: Arc<dyn StorageBackend>) -> Result<()> {
        *self.state.write() = AnnoyState::empty();
        *self.storage.write() = Some(storage.clone());
        let existing = storage
            .list_vectors(None)
            .map_err(IndexError::StorageFailure)?;
        let mut state = self.state.write();
        for id in existing {
            if let Some((vector, _)) = storage
                .retrieve_vector(&id)
                .map_err(IndexError::StorageFailure)?
            {
                if self.dimension.read().is_none() {
                    *self.dimension.write() = Some(vector.len());
                }
                state.vectors.insert(id, vector);
            }
        }
        state.dirty = true;
        Ok(())
    }

    fn insert(
        &self,
        vectors: Vec<Vector>,
        metadata: Vec<Option<Metadata>>,
    ) -> Result<Vec<VectorId>> {
        let storage = self.storage()?;
        let mut inserted = Vec::with_capacity(vectors.len());
        let mut state = self.state.write();

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
                state.vectors.insert(id, vector);
                inserted.push(id);
            }
        }
        state.dirty = true;
        Ok(inserted)
    }

    fn search(&self, query: &Vector, k: usize) -> Result<Vec<SearchResult>> {
        let storage = self.storage()?;
        if let Some(d) = *self.dimension.read() {
            check_dimension(d, query)?;
        }

        let mut state = self.state.write();
        if state.dirty {
            self.rebuild(&mut state);
        }

        let search_k = self.config.effective_search_k();
        let mut candidates = HashSet::new();
        for tree in &state.trees {
            candidates.extend(collect_candidates(tree, query, search_k));
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
                state.tombstones.insert(*id);
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
                state.vectors.insert(*id, new_vector);
                state.dirty = true;
            }
        }
        Ok(updated)
    }

    fn get_stats(&self) -> IndexStats {
        let state = self.state.read();
        let mut stats = IndexStats::new();
        stats.insert(
            "vector_count".to_string(),
            serde_json::json!(state.live_ids().len()),
        );
        stats.insert("dimension".to_string(), serde_json::json!(*self.dimension.read()));
        stats.insert("num_trees".to_string(), serde_json::json!(state.trees.len()));
        stats.insert("built".to_string(), serde_json::json!(!state.dirty));
        stats
    }

    fn close(&self) -> Result<()> {
        *self.state.write() = AnnoyState::empty();
        Ok(())
    }
}
