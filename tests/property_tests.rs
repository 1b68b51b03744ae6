//! Property tests for the metric identities and the dense/sparse
//! equivalence contract, over random sets in an index space of 1024.

use proptest::prelude::*;

use kmerdb::metrics::{metric_by_key, METRICS};
use kmerdb::vector::{bool_vec, coords_to_vec, vec_to_coords, ElementType};

const IDX_LEN: u64 = 1024;

fn set_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::btree_set(0u64..IDX_LEN, 0..200)
        .prop_map(|set| set.into_iter().collect())
}

fn intersection_size(q: &[u64], r: &[u64]) -> u64 {
    let rset: std::collections::BTreeSet<u64> = r.iter().copied().collect();
    q.iter().filter(|i| rset.contains(i)).count() as u64
}

proptest! {
    /// hamming = a + b - 2i and jaccard = i / (a + b - i) for sets of
    /// sizes a and b with intersection i.
    #[test]
    fn metric_size_identities(q in set_strategy(), r in set_strategy()) {
        let (a, b) = (q.len() as u64, r.len() as u64);
        let i = intersection_size(&q, &r);

        let hamming = metric_by_key("hamming").unwrap();
        let jaccard = metric_by_key("jaccard").unwrap();
        let asym = metric_by_key("asym_jacc").unwrap();

        prop_assert_eq!(hamming.sparse(&q, &r), (a + b - 2 * i) as f32);

        let union = a + b - i;
        let j = jaccard.sparse(&q, &r);
        if union == 0 {
            prop_assert!(j.is_nan());
        } else {
            prop_assert_eq!(j, i as f32 / union as f32);
        }

        let aj = asym.sparse(&q, &r);
        if b == 0 {
            prop_assert!(aj.is_nan());
        } else {
            prop_assert_eq!(aj, i as f32 / b as f32);
        }
    }

    /// Dense and sparse implementations agree for every metric.
    #[test]
    fn dense_sparse_equivalence(q in set_strategy(), r in set_strategy()) {
        let qv = bool_vec(q.iter().copied(), IDX_LEN, None).unwrap().to_bool();
        let rv = bool_vec(r.iter().copied(), IDX_LEN, None).unwrap().to_bool();

        for metric in METRICS {
            let dense = metric.dense(qv.view(), rv.view());
            let sparse = metric.sparse(&q, &r);
            prop_assert!(
                dense == sparse || (dense.is_nan() && sparse.is_nan()),
                "{}: dense {} != sparse {}",
                metric.key,
                dense,
                sparse
            );
        }
    }

    /// coords_to_vec(vec_to_coords(x)) is the identity.
    #[test]
    fn coords_round_trip(q in set_strategy()) {
        let vec = bool_vec(q.iter().copied(), IDX_LEN, None).unwrap();
        let coords = vec_to_coords(&vec, false);
        prop_assert_eq!(coords.indices(), &q[..]);
        let back = coords_to_vec(&coords, IDX_LEN, ElementType::Bool).unwrap();
        prop_assert_eq!(back, vec);
    }

    /// Coordinate arrays built from vectors always satisfy the
    /// representation invariants.
    #[test]
    fn coords_are_valid(q in set_strategy()) {
        let vec = bool_vec(q.iter().copied(), IDX_LEN, None).unwrap();
        let coords = vec_to_coords(&vec, true);
        prop_assert!(coords.validate(IDX_LEN).is_ok());
        prop_assert!(coords.counts().unwrap().iter().all(|&c| c == 1));
    }
}
