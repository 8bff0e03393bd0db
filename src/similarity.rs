//! Pure numeric distance functions over equal-length vectors.
//!
//! Deterministic, commutative (except dot product's sign, which callers
//! negate for ranking), allocation-free. The only failure mode is a length
//! mismatch, surfaced by the caller as `IndexError::DimensionMismatch`
//! rather than by these functions, which are infallible `f64 -> f64`.

use crate::types::{Metric, Vector};

/// 1 − cosine similarity. Returns 1.0 (maximum distance) if either vector
/// has zero norm.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot / (norm_a * norm_b)
    }
}

/// √Σ(aᵢ−bᵢ)².
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Σ aᵢbᵢ. Not itself a distance: indices that rank by dot product negate
/// this so that smallest-is-best holds uniformly across metrics.
pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Σ|aᵢ−bᵢ|.
pub fn manhattan_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Dispatch to the configured metric, with dot product already negated so
/// every metric in the returned value follows ascending-best.
pub fn distance(metric: Metric, a: &Vector, b: &Vector) -> f64 {
    match metric {
        Metric::Cosine => cosine_distance(a, b),
        Metric::Euclidean => euclidean_distance(a, b),
        Metric::DotProduct => -dot_product(a, b),
        Metric::Manhattan => manhattan_distance(a, b),
    }
}
