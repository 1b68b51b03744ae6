//! Parallel scoring of query k-mer sets against a collection's
//! reference sets.
//!
//! The reference list is split into disjoint contiguous slices, one per
//! worker. Each worker owns a private storage-format reader, streams
//! through its slice loading one reference at a time, and scores it
//! against every query and every requested metric. Workers write into
//! non-overlapping slabs of the shared score array, so the only
//! coordination on the hot path is the progress counter. Cancellation
//! is cooperative and checked between reference sets.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use ndarray::{Array3, ArrayView2, Axis};

use crate::db::catalog::{KmerCollection, KmerSetRow};
use crate::db::Database;
use crate::metrics::{metric_by_key, Metric};
use crate::utils::get_num_threads;
use crate::vector::{vec_to_coords, DenseVector, KmerCoords};

/// Callback fed monotonically increasing completion counts.
pub type ProgressSink = Box<dyn Fn(u64) + Send + Sync>;

/// Options for a query run.
pub struct QueryOptions {
    /// Keys of the metrics to compute; must be non-empty.
    pub metrics: Vec<String>,
    /// Worker threads; 0 means one per logical core.
    pub workers: usize,
    pub progress: Option<ProgressSink>,
    /// Cooperative cancel flag, checked between reference sets.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            metrics: crate::metrics::metric_keys()
                .into_iter()
                .map(String::from)
                .collect(),
            workers: 0,
            progress: None,
            cancel: None,
        }
    }
}

/// Result of a query run. Slots of references that failed to load (or
/// were never reached after a cancellation) hold NaN.
pub struct QueryScores {
    /// `scores[metric, ref, query]`.
    pub scores: Array3<f32>,
    /// Resolved metrics in score-array order.
    pub metrics: Vec<&'static Metric>,
    /// References that failed to load; the batch proceeds past them.
    pub errors: u64,
    /// References actually scored.
    pub completed: u64,
}

/// Converts a `(Q, N)` boolean query array to the per-query coordinate
/// form the engine scores with.
pub fn queries_from_array(queries: ArrayView2<'_, bool>) -> Vec<KmerCoords> {
    queries
        .outer_iter()
        .map(|row| {
            let vec = DenseVector::Bool(row.to_owned());
            vec_to_coords(&vec, false)
        })
        .collect()
}

/// Scores every query against every reference set of a collection.
pub fn query_collection(
    db: &Database,
    collection: &KmerCollection,
    ref_sets: &[KmerSetRow],
    queries: &[KmerCoords],
    options: &QueryOptions,
) -> Result<QueryScores> {
    if options.metrics.is_empty() {
        return Err(anyhow!("At least one query metric is required"));
    }
    let metrics = options
        .metrics
        .iter()
        .map(|key| metric_by_key(key))
        .collect::<Result<Vec<_>, _>>()?;

    let n_refs = ref_sets.len();
    let n_queries = queries.len();
    let workers = get_num_threads(options.workers);
    info!(
        "Querying {} reference sets with {} queries and {} metrics on {} workers",
        n_refs,
        n_queries,
        metrics.len(),
        workers
    );

    let mut scores = Array3::<f32>::from_elem((metrics.len(), n_refs, n_queries), f32::NAN);

    let completed = AtomicU64::new(0);
    let errors = AtomicU64::new(0);

    if n_refs > 0 && n_queries > 0 {
        let chunk = n_refs.div_ceil(workers);
        let mut tasks = Vec::with_capacity(workers);
        for (ref_chunk, score_chunk) in ref_sets
            .chunks(chunk)
            .zip(scores.axis_chunks_iter_mut(Axis(1), chunk))
        {
            // One private reader per worker.
            let loader = db.set_loader(collection)?;
            tasks.push((ref_chunk, score_chunk, loader));
        }

        let metrics = &metrics;
        let completed = &completed;
        let errors = &errors;
        let progress = options.progress.as_deref();
        let cancel = options.cancel.as_deref();

        rayon::scope(|scope| {
            for (ref_chunk, mut score_chunk, loader) in tasks {
                scope.spawn(move |_| {
                    for (i, set) in ref_chunk.iter().enumerate() {
                        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                            debug!("Query cancelled; worker stopping");
                            return;
                        }
                        let coords = match loader.load_coords(set, false) {
                            Ok(coords) => coords,
                            Err(e) => {
                                warn!(
                                    "Error loading reference set for genome {}: {e:#}",
                                    set.genome_id
                                );
                                errors.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }
                        };
                        for (m, metric) in metrics.iter().enumerate() {
                            for (q, query) in queries.iter().enumerate() {
                                score_chunk[(m, i, q)] =
                                    metric.sparse(query.indices(), coords.indices());
                            }
                        }
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(sink) = progress {
                            sink(done);
                        }
                    }
                });
            }
        });
    }

    Ok(QueryScores {
        scores,
        metrics,
        errors: errors.into_inner(),
        completed: completed.into_inner(),
    })
}

/// One row of the ranked match table. `rank` starts at 1; ties keep
/// ascending reference order.
#[derive(Debug, Clone, Copy)]
pub struct QueryMatch {
    pub query: usize,
    pub metric: &'static Metric,
    pub rank: usize,
    pub score: f32,
    pub ref_index: usize,
}

/// Ranks the top `n` references per (query, metric). Distances sort
/// ascending, similarities descending, and NaN always sorts last.
pub fn top_matches(result: &QueryScores, n: usize) -> Vec<QueryMatch> {
    let (_, n_refs, n_queries) = result.scores.dim();
    let mut matches = Vec::new();

    for query in 0..n_queries {
        for (m, metric) in result.metrics.iter().enumerate() {
            let worst = if metric.is_distance {
                f32::INFINITY
            } else {
                f32::NEG_INFINITY
            };
            let sort_val =
                |ref_index: usize| -> f32 {
                    let score = result.scores[(m, ref_index, query)];
                    if score.is_nan() {
                        worst
                    } else {
                        score
                    }
                };

            let mut order: Vec<usize> = (0..n_refs).collect();
            // Stable sort keeps ties in ascending reference order.
            if metric.is_distance {
                order.sort_by(|&a, &b| {
                    sort_val(a)
                        .partial_cmp(&sort_val(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            } else {
                order.sort_by(|&a, &b| {
                    sort_val(b)
                        .partial_cmp(&sort_val(a))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }

            for (rank, &ref_index) in order.iter().take(n).enumerate() {
                matches.push(QueryMatch {
                    query,
                    metric,
                    rank: rank + 1,
                    score: result.scores[(m, ref_index, query)],
                    ref_index,
                });
            }
        }
    }
    matches
}
