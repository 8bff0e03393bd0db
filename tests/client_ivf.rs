use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use vectorlite::{Client, IndexError, IvfConfig, IvfIndex, MemoryStorage, Metric};

#[test]
fn s4_ivf_auto_trains_and_finds_seed_vector() {
    let storage = Arc::new(MemoryStorage::new());
    let index = Arc::new(
        IvfIndex::new(IvfConfig {
            metric: Metric::Euclidean,
            num_clusters: 10,
            num_probes: 3,
            random_seed: Some(42),
            ..Default::default()
        })
        .unwrap(),
    );
    let client = Client::new(storage, index);
    client.initialize().unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let vectors: Vec<Vec<f64>> = (0..100)
        .map(|_| (0..64).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    let ids = client.insert(vectors.clone(), vec![None; 100]).unwrap();

    let results = client.search(&vectors[0], 10).unwrap();
    assert!(results.iter().any(|r| r.id == ids[0] && r.distance < 0.01));
}

#[test]
fn search_before_any_insert_reports_not_trained() {
    let storage = Arc::new(MemoryStorage::new());
    let index = Arc::new(IvfIndex::new(IvfConfig::default()).unwrap());
    let client = Client::new(storage, index);
    client.initialize().unwrap();

    let err = client.search(&vec![0.0; 8], 1).unwrap_err();
    assert!(matches!(err, IndexError::NotTrained));
}
