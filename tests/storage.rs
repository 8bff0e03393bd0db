use tempfile::TempDir;
use vectorlite::{DiskStorage, HybridStorage, MemoryStorage, StorageBackend, VectorId};

#[test]
fn memory_storage_reports_len_and_deletes() {
    let storage = MemoryStorage::new();
    let id = VectorId::new();
    storage.store_vector(id, vec![1.0, 2.0], None).unwrap();
    assert_eq!(storage.len(), 1);
    assert!(storage.delete_vector(&id).unwrap());
    assert!(storage.is_empty());
}

#[test]
fn disk_storage_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let id = VectorId::new();
    {
        let storage = DiskStorage::open(dir.path()).unwrap();
        storage.store_vector(id, vec![4.0, 5.0, 6.0], None).unwrap();
    }
    let reopened = DiskStorage::open(dir.path()).unwrap();
    let (vector, _) = reopened.retrieve_vector(&id).unwrap().unwrap();
    assert_eq!(vector, vec![4.0, 5.0, 6.0]);
}

#[test]
fn hybrid_storage_serves_correct_data_after_cache_eviction() {
    let dir = TempDir::new().unwrap();
    let storage = HybridStorage::open(dir.path(), 1).unwrap();
    let id1 = VectorId::new();
    let id2 = VectorId::new();
    storage.store_vector(id1, vec![1.0], None).unwrap();
    storage.store_vector(id2, vec![2.0], None).unwrap();
    let (vector, _) = storage.retrieve_vector(&id1).unwrap().unwrap();
    assert_eq!(vector, vec![1.0]);
}

#[test]
fn pagination_across_backends_covers_every_id() {
    let dir = TempDir::new().unwrap();
    let storage = DiskStorage::open(dir.path()).unwrap();
    let ids: Vec<VectorId> = (0..23)
        .map(|i| {
            let id = VectorId::new();
            storage.store_vector(id, vec![i as f64], None).unwrap();
            id
        })
        .collect();

    let mut seen = Vec::new();
    let mut cursor: Option<Vec<u8>> = None;
    loop {
        let page = storage.list_vector_ids_paginated(7, cursor.as_deref()).unwrap();
        seen.extend(page.items.clone());
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }
    let mut expected = ids.clone();
    expected.sort();
    seen.sort();
    assert_eq!(seen, expected);
}
