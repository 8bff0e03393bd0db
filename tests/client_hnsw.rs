use std::sync::Arc;
use vectorlite::{Client, HnswConfig, HnswIndex, MemoryStorage, Metric};

#[test]
fn s3_hnsw_small_set_returns_exact_match_first() {
    let storage = Arc::new(MemoryStorage::new());
    let index = Arc::new(
        HnswIndex::new(HnswConfig {
            metric: Metric::Cosine,
            m: 8,
            ef_construction: 100,
            ef_search: 50,
        })
        .unwrap(),
    );
    let client = Client::new(storage, index);
    client.initialize().unwrap();

    let ids = client
        .insert(
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
            vec![None, None, None],
        )
        .unwrap();

    let results = client.search(&vec![1.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(results[0].id, ids[0]);
    assert!(results[0].distance < 1e-6);
}

#[test]
fn reopen_rebuilds_graph_and_still_finds_exact_match() {
    let storage = Arc::new(MemoryStorage::new());
    let index = Arc::new(HnswIndex::new(HnswConfig::default()).unwrap());
    let client = Client::new(storage.clone(), index);
    client.initialize().unwrap();
    let ids = client
        .insert(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![None, None])
        .unwrap();

    // Simulate a reopen: fresh index instance over the same storage.
    let index2 = Arc::new(HnswIndex::new(HnswConfig::default()).unwrap());
    let client2 = Client::new(storage, index2);
    client2.initialize().unwrap();

    let results = client2.search(&vec![1.0, 0.0], 1).unwrap();
    assert_eq!(results[0].id, ids[0]);
}
