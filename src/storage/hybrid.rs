use super::{DiskStorage, StorageBackend};
use crate::error::StorageError;
use crate::types::{Metadata, Page, Vector, VectorId};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::Path;

/// Disk storage fronted by an LRU cache of `cache_size` entries.
///
/// Every read/write still goes through [`DiskStorage`] for durability; the
/// cache only saves a re-read on hot ids.
pub struct HybridStorage {
    disk: DiskStorage,
    cache: Mutex<LruCache<VectorId, (Vector, Option<Metadata>)>>,
}

impl HybridStorage {
    pub fn open(data_dir: impl AsRef<Path>, cache_size: usize) -> Result<Self, StorageError> {
        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap();
        Ok(Self {
            disk: DiskStorage::open(data_dir)?,
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }
}

impl StorageBackend for HybridStorage {
    fn store_vector(
        &self,
        id: VectorId,
        vector: Vector,
        metadata: Option<Metadata>,
    ) -> Result<bool, StorageError> {
        let stored = self.disk.store_vector(id, vector.clone(), metadata.clone())?;
        if stored {
            self.cache.lock().put(id, (vector, metadata));
        }
        Ok(stored)
    }

    fn retrieve_vector(
        &self,
        id: &VectorId,
    ) -> Result<Option<(Vector, Option<Metadata>)>, StorageError> {
        if let Some(hit) = self.cache.lock().get(id).cloned() {
            return Ok(Some(hit));
        }
        let result = self.disk.retrieve_vector(id)?;
        if let Some(ref entry) = result {
            self.cache.lock().put(*id, entry.clone());
        }
        Ok(result)
    }

    fn update_vector(
        &self,
        id: &VectorId,
        vector: Option<Vector>,
        metadata: Option<Metadata>,
    ) -> Result<bool, StorageError> {
        let updated = self.disk.update_vector(id, vector, metadata)?;
        if updated {
            // Invalidate rather than patch: the cache must never serve a
            // stale entry after a write it didn't itself perform atomically.
            self.cache.lock().pop(id);
        }
        Ok(updated)
    }

    fn delete_vector(&self, id: &VectorId) -> Result<bool, StorageError> {
        let deleted = self.disk.delete_vector(id)?;
        if deleted {
            self.cache.lock().pop(id);
        }
        Ok(deleted)
    }

    fn list_vectors(&self, limit: Option<usize>) -> Result<Vec<VectorId>, StorageError> {
        self.disk.list_vectors(limit)
    }

    fn list_vector_ids_paginated(
        &self,
        page_size: usize,
        cursor: Option<&[u8]>,
    ) -> Result<Page<VectorId>, StorageError> {
        self.disk.list_vector_ids_paginated(page_size, cursor)
    }

    fn len(&self) -> usize {
        self.disk.len()
    }

    fn close(&self) -> Result<(), StorageError> {
        self.cache.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn update_invalidates_cached_entry() {
        let dir = TempDir::new().unwrap();
        let storage = HybridStorage::open(dir.path(), 4).unwrap();
        let id = VectorId::new();
        storage.store_vector(id, vec![1.0], None).unwrap();
        // warm the cache
        storage.retrieve_vector(&id).unwrap();
        storage.update_vector(&id, Some(vec![2.0]), None).unwrap();
        let (v, _) = storage.retrieve_vector(&id).unwrap().unwrap();
        assert_eq!(v, vec![2.0]);
    }

    #[test]
    fn cache_eviction_still_serves_correct_data_from_disk() {
        let dir = TempDir::new().unwrap();
        let storage = HybridStorage::open(dir.path(), 1).unwrap();
        let id1 = VectorId::new();
        let id2 = VectorId::new();
        storage.store_vector(id1, vec![1.0], None).unwrap();
        storage.store_vector(id2, vec![2.0], None).unwrap(); // evicts id1 from cache
        let (v, _) = storage.retrieve_vector(&id1).unwrap().unwrap();
        assert_eq!(v, vec![1.0]);
    }
}
