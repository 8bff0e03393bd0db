use std::sync::Arc;
use vectorlite::{AnnoyConfig, AnnoyIndex, Client, MemoryStorage};

#[test]
fn s5_annoy_finds_exact_match_after_auto_build() {
    let storage = Arc::new(MemoryStorage::new());
    let index = Arc::new(
        AnnoyIndex::new(AnnoyConfig {
            num_trees: 10,
            max_leaf_size: 8,
            random_seed: Some(21),
            ..Default::default()
        })
        .unwrap(),
    );
    let client = Client::new(storage, index);
    client.initialize().unwrap();

    let vectors: Vec<Vec<f64>> = (0..60)
        .map(|i| vec![i as f64, (i * 3) as f64, (i % 5) as f64])
        .collect();
    let ids = client.insert(vectors.clone(), vec![None; 60]).unwrap();

    let results = client.search(&vectors[30], 5).unwrap();
    assert!(results.iter().any(|r| r.id == ids[30] && r.distance < 1e-9));
}

#[test]
fn deleted_ids_are_tombstoned_out_of_future_searches() {
    let storage = Arc::new(MemoryStorage::new());
    let index = Arc::new(AnnoyIndex::new(AnnoyConfig::default()).unwrap());
    let client = Client::new(storage, index);
    client.initialize().unwrap();

    let ids = client
        .insert(
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
            vec![None, None, None],
        )
        .unwrap();
    client.delete(&[ids[0]]).unwrap();

    let results = client.search(&vec![1.0, 0.0, 0.0], 3).unwrap();
    assert!(!results.iter().any(|r| r.id == ids[0]));
}
