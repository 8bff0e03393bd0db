use std::sync::Arc;
use vectorlite::{Client, FlatConfig, FlatIndex, MemoryStorage, Metric};

fn client(metric: Metric) -> Client {
    let storage = Arc::new(MemoryStorage::new());
    let index = Arc::new(FlatIndex::new(FlatConfig { metric }).unwrap());
    let client = Client::new(storage, index);
    client.initialize().unwrap();
    client
}

#[test]
fn s1_cosine_basis_vectors_return_axis_metadata() {
    let client = client(Metric::Cosine);
    let metas = ["x", "y", "z"].iter().map(|axis| {
        Some(vectorlite::Metadata::from([(
            "axis".to_string(),
            vectorlite::MetadataValue::String(axis.to_string()),
        )]))
    });
    client
        .insert(
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
            metas.collect(),
        )
        .unwrap();

    let results = client.search(&vec![1.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].distance < 1e-6);
}

#[test]
fn s2_euclidean_distances_ascend_in_expected_order() {
    let client = client(Metric::Euclidean);
    client
        .insert(
            vec![vec![0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0], vec![3.0, 4.0, 0.0]],
            vec![None, None, None],
        )
        .unwrap();

    let results = client.search(&vec![0.0, 0.0, 0.0], 3).unwrap();
    let distances: Vec<f64> = results.iter().map(|r| r.distance).collect();
    assert_eq!(distances, vec![0.0, 1.0, 5.0]);
}

#[test]
fn update_and_delete_round_trip_through_the_facade() {
    let client = client(Metric::Cosine);
    let ids = client
        .insert(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![None, None])
        .unwrap();
    assert!(client.update(&ids[0], Some(vec![0.0, 1.0]), None).unwrap());
    assert!(client.delete(&[ids[1]]).unwrap());
    let remaining = client.list_vector_ids(None).unwrap();
    assert_eq!(remaining, vec![ids[0]]);
}

#[test]
fn paginated_listing_covers_every_inserted_id_exactly_once() {
    let client = client(Metric::Cosine);
    let vectors: Vec<Vec<f64>> = (0..37).map(|i| vec![i as f64, 0.0]).collect();
    let ids = client.insert(vectors, vec![None; 37]).unwrap();

    let mut seen = Vec::new();
    let mut cursor: Option<Vec<u8>> = None;
    loop {
        let page = client.list_vector_ids_paginated(10, cursor.as_deref()).unwrap();
        seen.extend(page.items.clone());
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }
    seen.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(seen, expected);
}
