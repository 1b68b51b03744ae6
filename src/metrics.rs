//! Set-similarity metrics between two k-mer sets over the same spec.
//!
//! Every metric has a dense implementation (element-wise over two
//! presence vectors) and a sparse implementation (a sorted merge-walk
//! over two coordinate arrays, `O(|Q| + |R|)` with no allocation). Both
//! count with integers and divide once at the end, so the two paths
//! agree exactly on integer returns and to the bit on float returns.
//!
//! Jaccard on two empty sets and asymmetric Jaccard against an empty
//! reference produce NaN; the ranker treats NaN as the worst score.

use ndarray::ArrayView1;

use crate::errors::{KmerDbError, Result};

/// What a metric returns; scores are widened to `f32` for uniform
/// storage either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    UInt,
    Float,
}

/// One entry of the metric registry.
pub struct Metric {
    pub key: &'static str,
    pub title: &'static str,
    pub kind: ReturnKind,
    /// Distances rank ascending, similarities descending.
    pub is_distance: bool,
    dense: fn(ArrayView1<'_, bool>, ArrayView1<'_, bool>) -> f32,
    sparse: fn(&[u64], &[u64]) -> f32,
}

impl Metric {
    pub fn dense(&self, query: ArrayView1<'_, bool>, reference: ArrayView1<'_, bool>) -> f32 {
        (self.dense)(query, reference)
    }

    pub fn sparse(&self, query: &[u64], reference: &[u64]) -> f32 {
        (self.sparse)(query, reference)
    }
}

impl std::fmt::Debug for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metric")
            .field("key", &self.key)
            .field("is_distance", &self.is_distance)
            .finish()
    }
}

/// The registry, in a fixed order. Built explicitly rather than by
/// registration side effects so lookup order is stable.
pub static METRICS: &[Metric] = &[
    Metric {
        key: "hamming",
        title: "Hamming distance",
        kind: ReturnKind::UInt,
        is_distance: true,
        dense: dense_hamming,
        sparse: sparse_hamming,
    },
    Metric {
        key: "jaccard",
        title: "Jaccard index",
        kind: ReturnKind::Float,
        is_distance: false,
        dense: dense_jaccard,
        sparse: sparse_jaccard,
    },
    Metric {
        key: "asym_jacc",
        title: "Asymmetrical Jaccard",
        kind: ReturnKind::Float,
        is_distance: false,
        dense: dense_asym_jacc,
        sparse: sparse_asym_jacc,
    },
];

pub fn metric_by_key(key: &str) -> Result<&'static Metric> {
    METRICS
        .iter()
        .find(|m| m.key == key)
        .ok_or_else(|| KmerDbError::UnknownMetric(key.to_string()))
}

pub fn metric_keys() -> Vec<&'static str> {
    METRICS.iter().map(|m| m.key).collect()
}

// Dense implementations.

fn dense_hamming(query: ArrayView1<'_, bool>, reference: ArrayView1<'_, bool>) -> f32 {
    let mut dist: u64 = 0;
    for (&q, &r) in query.iter().zip(reference.iter()) {
        dist += u64::from(q ^ r);
    }
    dist as f32
}

fn dense_jaccard(query: ArrayView1<'_, bool>, reference: ArrayView1<'_, bool>) -> f32 {
    let mut intersection: u64 = 0;
    let mut union: u64 = 0;
    for (&q, &r) in query.iter().zip(reference.iter()) {
        intersection += u64::from(q & r);
        union += u64::from(q | r);
    }
    intersection as f32 / union as f32
}

fn dense_asym_jacc(query: ArrayView1<'_, bool>, reference: ArrayView1<'_, bool>) -> f32 {
    let mut intersection: u64 = 0;
    let mut ref_weight: u64 = 0;
    for (&q, &r) in query.iter().zip(reference.iter()) {
        intersection += u64::from(q & r);
        ref_weight += u64::from(r);
    }
    intersection as f32 / ref_weight as f32
}

// Sparse implementations: a single merge-walk maintaining the counts
// each metric needs. Both arrays are strictly increasing.

fn sparse_hamming(query: &[u64], reference: &[u64]) -> f32 {
    let (n, m) = (query.len(), reference.len());
    let mut dist: u64 = 0;
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        let (q, r) = (query[i], reference[j]);
        if q != r {
            dist += 1;
        }
        if q <= r {
            i += 1;
        }
        if r <= q {
            j += 1;
        }
    }
    dist += (n - i) as u64;
    dist += (m - j) as u64;
    dist as f32
}

fn sparse_jaccard(query: &[u64], reference: &[u64]) -> f32 {
    let (n, m) = (query.len(), reference.len());
    let mut intersection: u64 = 0;
    let mut union: u64 = 0;
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        let (q, r) = (query[i], reference[j]);
        union += 1;
        if q == r {
            intersection += 1;
        }
        if q <= r {
            i += 1;
        }
        if r <= q {
            j += 1;
        }
    }
    union += (n - i) as u64;
    union += (m - j) as u64;
    intersection as f32 / union as f32
}

fn sparse_asym_jacc(query: &[u64], reference: &[u64]) -> f32 {
    let (n, m) = (query.len(), reference.len());
    let mut intersection: u64 = 0;
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        let (q, r) = (query[i], reference[j]);
        if q == r {
            intersection += 1;
        }
        if q <= r {
            i += 1;
        }
        if r <= q {
            j += 1;
        }
    }
    intersection as f32 / m as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{bool_vec, vec_to_coords, DenseVector};

    fn dense(indices: &[u64], idx_len: u64) -> DenseVector {
        bool_vec(indices.iter().copied(), idx_len, None).unwrap()
    }

    fn both(metric: &Metric, q: &[u64], r: &[u64], idx_len: u64) -> (f32, f32) {
        let qv = dense(q, idx_len).to_bool();
        let rv = dense(r, idx_len).to_bool();
        let d = metric.dense(qv.view(), rv.view());
        let qc = vec_to_coords(&dense(q, idx_len), false);
        let rc = vec_to_coords(&dense(r, idx_len), false);
        let s = metric.sparse(qc.indices(), rc.indices());
        (d, s)
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(metric_by_key("hamming").unwrap().title, "Hamming distance");
        assert!(metric_by_key("hamming").unwrap().is_distance);
        assert!(!metric_by_key("jaccard").unwrap().is_distance);
        assert!(matches!(
            metric_by_key("cosine"),
            Err(KmerDbError::UnknownMetric(_))
        ));
        assert_eq!(metric_keys(), vec!["hamming", "jaccard", "asym_jacc"]);
    }

    #[test]
    fn test_hamming_counts_symmetric_difference() {
        let (d, s) = both(metric_by_key("hamming").unwrap(), &[0, 2, 5], &[2, 5, 6, 7], 16);
        assert_eq!(d, 3.0);
        assert_eq!(s, 3.0);
    }

    #[test]
    fn test_jaccard_known_value() {
        // |Q ∩ R| = 2, |Q ∪ R| = 5.
        let (d, s) = both(metric_by_key("jaccard").unwrap(), &[0, 2, 5], &[2, 5, 6, 7], 16);
        assert_eq!(d, 2.0 / 5.0);
        assert_eq!(s, 2.0 / 5.0);
    }

    #[test]
    fn test_asym_jaccard_divides_by_reference() {
        let (d, s) = both(
            metric_by_key("asym_jacc").unwrap(),
            &[0, 2, 5],
            &[2, 5, 6, 7],
            16,
        );
        assert_eq!(d, 2.0 / 4.0);
        assert_eq!(s, 2.0 / 4.0);
    }

    #[test]
    fn test_identical_sets() {
        let q = &[1u64, 4, 9];
        assert_eq!(both(metric_by_key("hamming").unwrap(), q, q, 16), (0.0, 0.0));
        assert_eq!(both(metric_by_key("jaccard").unwrap(), q, q, 16), (1.0, 1.0));
        assert_eq!(
            both(metric_by_key("asym_jacc").unwrap(), q, q, 16),
            (1.0, 1.0)
        );
    }

    #[test]
    fn test_empty_sets_yield_nan_not_panic() {
        let (d, s) = both(metric_by_key("jaccard").unwrap(), &[], &[], 16);
        assert!(d.is_nan() && s.is_nan());
        let (d, s) = both(metric_by_key("asym_jacc").unwrap(), &[1, 2], &[], 16);
        assert!(d.is_nan() && s.is_nan());
        // Hamming has no divisor and stays finite.
        let (d, s) = both(metric_by_key("hamming").unwrap(), &[], &[], 16);
        assert_eq!((d, s), (0.0, 0.0));
    }

    #[test]
    fn test_size_identities() {
        // hamming = a + b - 2i, jaccard = i / (a + b - i).
        let q = &[0u64, 1, 2, 3, 10, 11];
        let r = &[2u64, 3, 4, 5, 10];
        let (a, b, i) = (6u64, 5u64, 3u64);
        let (dh, sh) = both(metric_by_key("hamming").unwrap(), q, r, 16);
        assert_eq!(dh, (a + b - 2 * i) as f32);
        assert_eq!(sh, dh);
        let (dj, sj) = both(metric_by_key("jaccard").unwrap(), q, r, 16);
        assert_eq!(dj, i as f32 / (a + b - i) as f32);
        assert_eq!(sj, dj);
    }
}
