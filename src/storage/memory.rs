use super::{paginate_sorted_ids, StorageBackend};
use crate::error::StorageError;
use crate::types::{Metadata, Page, Vector, VectorId};
use dashmap::DashMap;

/// Entire `{id -> (vector, metadata)}` map held in RAM.
pub struct MemoryStorage {
    entries: DashMap<VectorId, (Vector, Option<Metadata>)>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn store_vector(
        &self,
        id: VectorId,
        vector: Vector,
        metadata: Option<Metadata>,
    ) -> Result<bool, StorageError> {
        if self.entries.contains_key(&id) {
            return Ok(false);
        }
        self.entries.insert(id, (vector, metadata));
        Ok(true)
    }

    fn retrieve_vector(
        &self,
        id: &VectorId,
    ) -> Result<Option<(Vector, Option<Metadata>)>, StorageError> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }

    fn update_vector(
        &self,
        id: &VectorId,
        vector: Option<Vector>,
        metadata: Option<Metadata>,
    ) -> Result<bool, StorageError> {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return Ok(false);
        };
        if let Some(v) = vector {
            entry.0 = v;
        }
        if metadata.is_some() {
            entry.1 = metadata;
        }
        Ok(true)
    }

    fn delete_vector(&self, id: &VectorId) -> Result<bool, StorageError> {
        Ok(self.entries.remove(id).is_some())
    }

    fn list_vectors(&self, limit: Option<usize>) -> Result<Vec<VectorId>, StorageError> {
        let iter = self.entries.iter().map(|e| *e.key());
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }

    fn list_vector_ids_paginated(
        &self,
        page_size: usize,
        cursor: Option<&[u8]>,
    ) -> Result<Page<VectorId>, StorageError> {
        let ids: Vec<VectorId> = self.entries.iter().map(|e| *e.key()).collect();
        Ok(paginate_sorted_ids(ids, page_size, cursor))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_vector_rejects_duplicate_id() {
        let storage = MemoryStorage::new();
        let id = VectorId::new();
        assert!(storage.store_vector(id, vec![1.0], None).unwrap());
        assert!(!storage.store_vector(id, vec![2.0], None).unwrap());
    }

    #[test]
    fn update_vector_preserves_metadata_when_not_given() {
        let storage = MemoryStorage::new();
        let id = VectorId::new();
        let meta = Metadata::from([(
            "k".to_string(),
            crate::types::MetadataValue::Bool(true),
        )]);
        storage
            .store_vector(id, vec![1.0, 2.0], Some(meta.clone()))
            .unwrap();
        storage.update_vector(&id, Some(vec![3.0, 4.0]), None).unwrap();
        let (v, m) = storage.retrieve_vector(&id).unwrap().unwrap();
        assert_eq!(v, vec![3.0, 4.0]);
        assert_eq!(m, Some(meta));
    }

    #[test]
    fn delete_vector_returns_false_for_unknown_id() {
        let storage = MemoryStorage::new();
        assert!(!storage.delete_vector(&VectorId::new()).unwrap());
    }
}
