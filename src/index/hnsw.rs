use super::{Index, IndexStats};
use crate::error::{IndexError, Result};
use crate::storage::StorageBackend;
use crate::types::{check_dimension, IndexKind, Metadata, Metric, SearchResult, Vector, VectorId};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const MAX_LEVELS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct HnswConfig {
    pub metric: Metric,
    /// neighbors per node at level 0
    pub m: usize,
    /// candidate pool size during insertion
    pub ef_construction: usize,
    /// candidate pool size during query
    pub ef_search: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Cosine,
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

impl HnswConfig {
    pub fn validate(&self) -> Result<()> {
        if !IndexKind::Hnsw.supports(self.metric) {
            return Err(IndexError::UnsupportedMetric {
                metric: self.metric,
            });
        }
        if self.m == 0 {
            return Err(IndexError::ConfigError("m must be > 0".to_string()));
        }
        Ok(())
    }
}

struct Graph {
    /// level -> id -> neighbor ids. level[0] holds every resident vector.
    levels: Vec<HashMap<VectorId, HashSet<VectorId>>>,
    vectors: HashMap<VectorId, Vector>,
    node_level: HashMap<VectorId, usize>,
    entry_point: Option<VectorId>,
}

impl Graph {
    fn new() -> Self {
        Self {
            levels: vec![HashMap::new()],
            vectors: HashMap::new(),
            node_level: HashMap::new(),
            entry_point: None,
        }
    }

    fn ensure_levels(&mut self, up_to: usize) {
        while self.levels.len() <= up_to {
            self.levels.push(HashMap::new());
        }
    }
}

/// Hierarchical proximity-graph index. A reader/writer lock guards the
/// whole graph: searches take shared access, mutations take exclusive
/// access.
///
/// Construction uses the source's deliberately simplified O(N^2) insertion
/// (connect each new node to the `m` nearest among *all* currently-resident
/// nodes at each level, rather than efConstruction-driven greedy search) —
/// a deliberate design choice recorded (not silently "fixed") in
/// `DESIGN.md`.
pub struct HnswIndex {
    config: HnswConfig,
    storage: RwLock<Option<Arc<dyn StorageBackend>>>,
    graph: RwLock<Graph>,
    dimension: RwLock<Option<usize>>,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage: RwLock::new(None),
            graph: RwLock::new(Graph::new()),
            dimension: RwLock::new(None),
        })
    }

    fn storage(&self) -> Result<Arc<dyn StorageBackend>> {
        self.storage
            .read()
            .clone()
            .ok_or(IndexError::NotInitialized)
    }

    fn random_level(&self) -> usize {
        let mut level = 0;
        let mut rng = rand::thread_rng();
        while rng.gen::<f64>() < 0.5 && level < MAX_LEVELS - 1 {
            level += 1;
        }
        level
    }

    fn distance(&self, a: &Vector, b: &Vector) -> f64 {
        crate::similarity::distance(self.config.metric, a, b)
    }

    /// Connect `id` into the graph at levels `0..=level`, naively: at each
    /// level, compute distance to every resident node and take the nearest
    /// `m`, adding bidirectional edges.
    fn link_node(graph: &mut Graph, id: VectorId, vector: &Vector, level: usize, m: usize, metric: Metric) {
        graph.ensure_levels(level);
        for lvl in 0..=level {
            let residents: Vec<VectorId> = graph.levels[lvl].keys().copied().collect();
            let mut distances: Vec<(f64, VectorId)> = residents
                .into_iter()
                .map(|other_id| {
                    let other_vec = &graph.vectors[&other_id];
                    (crate::similarity::distance(metric, vector, other_vec), other_id)
                })
                .collect();
            distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            distances.truncate(m);

            let entry = graph.levels[lvl].entry(id).or_default();
            for (_, neighbor) in &distances {
                entry.insert(*neighbor);
            }
            for (_, neighbor) in distances {
                graph.levels[lvl].entry(neighbor).or_default().insert(id);
            }
        }
    }

    fn unlink_node(graph: &mut Graph, id: &VectorId) {
        if let Some(&level) = graph.node_level.get(id) {
            for lvl in 0..=level.min(graph.levels.len().saturating_sub(1)) {
                if let Some(neighbors) = graph.levels[lvl].remove(id) {
                    for neighbor in neighbors {
                        if let Some(set) = graph.levels[lvl].get_mut(&neighbor) {
                            set.remove(id);
                        }
                    }
                }
            }
        }
        graph.node_level.remove(id);
        graph.vectors.remove(id);
        if graph.entry_point.as_ref() == Some(id) {
            graph.entry_point = graph.levels[0].keys().next().copied();
        }
    }

    /// Greedy descent from the entry point, widening to `ef_search`
    /// candidates at each level, returning the best `k` by exact distance
    /// over the in-memory vector cache.
    fn graph_search(&self, graph: &Graph, query: &Vector, k: usize) -> Vec<(VectorId, f64)> {
        let Some(entry) = graph.entry_point else {
            return Vec::new();
        };
        let top_level = graph.levels.len().saturating_sub(1);
        let mut candidates: HashSet<VectorId> = HashSet::from([entry]);

        for lvl in (0..=top_level).rev() {
            let mut frontier = candidates.clone();
            let mut visited: HashSet<VectorId> = candidates.clone();
            let ef = if lvl == 0 {
                self.config.ef_search.max(k)
            } else {
                self.config.ef_search
            };

            // expand neighborhoods, keep the best `ef` by distance
            loop {
                let mut expanded = false;
                let mut next_frontier = HashSet::new();
                for id in &frontier {
                    if let Some(neighbors) = graph.levels.get(lvl).and_then(|l| l.get(id)) {
                        for n in neighbors {
                            if visited.insert(*n) {
                                next_frontier.insert(*n);
                                candidates.insert(*n);
                                expanded = true;
                            }
                        }
                    }
                }
                frontier = next_frontier;
                if !expanded || candidates.len() >= ef * 4 {
                    break;
                }
            }

            let mut ranked: Vec<(f64, VectorId)> = candidates
                .iter()
                .filter_map(|id| graph.vectors.get(id).map(|v| (self.distance(query, v), *id)))
                .collect();
            ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(ef);
            candidates = ranked.into_iter().map(|(_, id)| id).collect();
        }

        let mut final_ranked: Vec<(VectorId, f64)> = candidates
            .into_iter()
            .filter_map(|id| graph.vectors.get(&id).map(|v| (id, self.distance(query, v))))
            .collect();
        final_ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        final_ranked.truncate(k);
        final_ranked
    }
}

impl Index for HnswIndex {
    fn initialize(&self, storage: Arc<dyn StorageBackend>) -> Result<()> {
        let existing = storage
            .list_vectors(None)
            .map_err(IndexError::StorageFailure)?;
        let mut graph = self.graph.write();
        *graph = Graph::new();
        for id in existing {
            if let Some((vector, _)) = storage
                .retrieve_vector(&id)
                .map_err(IndexError::StorageFailure)?
            {
                if self.dimension.read().is_none() {
                    *self.dimension.write() = Some(vector.len());
                }
                let level = self.random_level();
                graph.node_level.insert(id, level);
                graph.vectors.insert(id, vector.clone());
                if graph.entry_point.is_none() {
                    graph.entry_point = Some(id);
                }
                Self::link_node(&mut graph, id, &vector, level, self.config.m, self.config.metric);
            }
        }
        drop(graph);
        *self.storage.write() = Some(storage);
        Ok(())
    }

    fn insert(
        &self,
        vectors: Vec<Vector>,
        metadata: Vec<Option<Metadata>>,
    ) -> Result<Vec<VectorId>> {
        let storage = self.storage()?;
        let mut graph = self.graph.write();
        let mut inserted = Vec::with_capacity(vectors.len());

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
                let level = self.random_level();
                graph.node_level.insert(id, level);
                graph.vectors.insert(id, vector.clone());
                if graph.entry_point.is_none() {
                    graph.entry_point = Some(id);
                }
                Self::link_node(&mut graph, id, &vector, level, self.config.m, self.config.metric);
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
        let graph = self.graph.read();
        let ranked = self.graph_search(&graph, query, k);
        drop(graph);

        let ids: Vec<VectorId> = ranked.iter().map(|(id, _)| *id).collect();
        super::top_k_by_distance(storage.as_ref(), self.config.metric, query, ids, k)
    }

    fn delete(&self, ids: &[VectorId]) -> Result<bool> {
        let storage = self.storage()?;
        let mut graph = self.graph.write();
        let mut all_found = true;
        for id in ids {
            let found = storage
                .delete_vector(id)
                .map_err(IndexError::StorageFailure)?;
            all_found &= found;
            if found {
                Self::unlink_node(&mut graph, id);
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
        let mut graph = self.graph.write();
        let previous_level = graph.node_level.get(id).copied();
        let updated = storage
            .update_vector(id, vector.clone(), metadata)
            .map_err(IndexError::StorageFailure)?;
        if updated {
            if let Some(new_vector) = vector {
                // remove then re-insert at the *same* level as before,
                // preserving the sparsity invariant across levels.
                Self::unlink_node(&mut graph, id);
                let level = previous_level.unwrap_or_else(|| self.random_level());
                graph.node_level.insert(*id, level);
                graph.vectors.insert(*id, new_vector.clone());
                if graph.entry_point.is_none() {
                    graph.entry_point = Some(*id);
                }
                Self::link_node(&mut graph, *id, &new_vector, level, self.config.m, self.config.metric);
            }
        }
        Ok(updated)
    }

    fn get_stats(&self) -> IndexStats {
        let graph = self.graph.read();
        let mut stats = IndexStats::new();
        stats.insert(
            "vector_count".to_string(),
            serde_json::json!(graph.vectors.len()),
        );
        stats.insert(
            "dimension".to_string(),
            serde_json::json!(*self.dimension.read()),
        );
        stats.insert("max_level".to_string(), serde_json::json!(graph.levels.len().saturating_sub(1)));
        stats.insert(
            "entry_point".to_string(),
            serde_json::json!(graph.entry_point.map(|id| id.to_string())),
        );
        stats.insert(
            "construction".to_string(),
            serde_json::json!("naive_m_nearest_per_level"),
        );
        stats
    }

    fn close(&self) -> Result<()> {
        *self.graph.write() = Graph::new();
        Ok(())
    }
}
