//! `Client` — binds one [`StorageBackend`] to one [`Index`] behind a single
//! facade. All methods delegate straight through; the
//! facade's only job is keeping the two halves initialized and closed
//! together.

use crate::error::{IndexError, Result};
use crate::index::{Index, IndexStats};
use crate::storage::StorageBackend;
use crate::types::{Metadata, Page, SearchResult, Vector, VectorId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Client {
    storage: Arc<dyn StorageBackend>,
    index: Arc<dyn Index>,
    initialized: AtomicBool,
    closed: RwLock<bool>,
}

impl Client {
    /// Construct a client over an already-built storage/index pair. Call
    /// [`Client::initialize`] before any other operation.
    pub fn new(storage: Arc<dyn StorageBackend>, index: Arc<dyn Index>) -> Self {
        Self {
            storage,
            index,
            initialized: AtomicBool::new(false),
            closed: RwLock::new(false),
        }
    }

    pub fn initialize(&self) -> Result<()> {
        self.index.initialize(self.storage.clone())?;
        self.initialized.store(true, Ordering::SeqCst);
        *self.closed.write() = false;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<()> {
        if *self.closed.read() || !self.is_initialized() {
            return Err(IndexError::NotInitialized);
        }
        Ok(())
    }

    pub fn insert(
        &self,
        vectors: Vec<Vector>,
        metadata: Vec<Option<Metadata>>,
    ) -> Result<Vec<VectorId>> {
        self.ensure_ready()?;
        self.index.insert(vectors, metadata)
    }

    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<SearchResult>> {
        self.ensure_ready()?;
        self.index.search(query, k)
    }

    pub fn batch_search(&self, queries: &[Vector], k: usize) -> Result<Vec<Vec<SearchResult>>> {
        self.ensure_ready()?;
        self.index.batch_search(queries, k)
    }

    pub fn delete(&self, ids: &[VectorId]) -> Result<bool> {
        self.ensure_ready()?;
        self.index.delete(ids)
    }

    pub fn update(
        &self,
        id: &VectorId,
        vector: Option<Vector>,
        metadata: Option<Metadata>,
    ) -> Result<bool> {
        self.ensure_ready()?;
        self.index.update(id, vector, metadata)
    }

    pub fn batch_update(
        &self,
        ids: &[VectorId],
        vectors: Vec<Option<Vector>>,
        metas: Vec<Option<Metadata>>,
    ) -> Result<Vec<bool>> {
        self.ensure_ready()?;
        self.index.batch_update(ids, vectors, metas)
    }

    pub fn list_vector_ids(&self, limit: Option<usize>) -> Result<Vec<VectorId>> {
        self.ensure_ready()?;
        self.storage
            .list_vectors(limit)
            .map_err(IndexError::StorageFailure)
    }

    pub fn list_vector_ids_paginated(
        &self,
        page_size: usize,
        cursor: Option<&[u8]>,
    ) -> Result<Page<VectorId>> {
        self.ensure_ready()?;
        self.storage
            .list_vector_ids_paginated(page_size, cursor)
            .map_err(IndexError::StorageFailure)
    }

    pub fn get_stats(&self) -> Result<IndexStats> {
        self.ensure_ready()?;
        let mut combined = IndexStats::new();
        combined.insert(
            "storage".to_string(),
            serde_json::json!({ "vector_count": self.storage.len() }),
        );
        combined.insert("index".to_string(), serde_json::to_value(self.index.get_stats()).unwrap_or_default());
        Ok(combined)
    }

    /// Idempotent: closing an already-closed client is a no-op. Closes the
    /// index before the storage backend, since the index's `close` may
    /// still read from storage while releasing its own structures.
    pub fn close(&self) -> Result<()> {
        if *self.closed.read() {
            return Ok(());
        }
        self.index.close()?;
        self.storage.close().map_err(IndexError::StorageFailure)?;
        *self.closed.write() = true;
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}
