//! Computes and stores the missing k-mer sets of a collection.
//!
//! Every genome without an entry under the collection is streamed
//! through the enumeration pipeline and stored via the collection's
//! storage format. A failing genome is logged and counted; the batch
//! never aborts. Re-running is idempotent: pairs already present are
//! skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::{info, warn};
use rayon::prelude::*;

use crate::db::catalog::{Genome, KmerCollection};
use crate::db::{AddOutcome, Database, KmerSetAdder};
use crate::parse::{vec_from_records, FastxRecords, VectorizeOptions};
use crate::query::ProgressSink;
use crate::utils::get_num_threads;

/// Options for a builder run.
#[derive(Default)]
pub struct BuildOptions {
    /// Worker threads; 0 means one per logical core.
    pub workers: usize,
    pub progress: Option<ProgressSink>,
    /// Cooperative cancel flag, checked between genomes.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Outcome of a builder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub added: u64,
    pub errors: u64,
    /// Genomes already present in the collection.
    pub skipped: u64,
}

/// Builds the k-mer set of one genome: assembled genomes get a presence
/// vector, unassembled ones keep counts.
fn compute_set(
    db: &Database,
    collection: &KmerCollection,
    genome: &Genome,
) -> Result<crate::vector::DenseVector> {
    let spec = collection.spec()?;
    let reader = db.open_genome(genome)?;
    let records = FastxRecords::from_reader(reader)
        .with_context(|| format!("Failed to parse genome {:?}", genome.filename))?;
    let opts = VectorizeOptions {
        counts: !genome.is_assembled,
        ..VectorizeOptions::default()
    };
    vec_from_records(records, &spec, &opts)
}

/// Computes k-mer sets for every genome the collection is missing.
pub fn build_reference_sets(
    db: &Database,
    collection: &KmerCollection,
    options: &BuildOptions,
) -> Result<BuildSummary> {
    let catalog = db.catalog()?;
    let total = catalog.table_counts()?.genomes;
    let missing = catalog.genomes_without_set(collection.id)?;
    drop(catalog);

    let already_present = total - missing.len() as u64;
    info!(
        "Building reference sets for collection {:?}: {} to compute, {} already present",
        collection.title,
        missing.len(),
        already_present
    );

    let added = AtomicU64::new(0);
    let errors = AtomicU64::new(0);
    let skipped = AtomicU64::new(already_present);
    let done = AtomicU64::new(0);

    // One writable catalog session at a time: file writes and row
    // inserts are serialized through the adder while vector computation
    // runs in parallel.
    let adder: Mutex<KmerSetAdder> = Mutex::new(db.set_adder(collection)?);
    let progress = options.progress.as_deref();
    let cancel = options.cancel.as_deref();

    let workers = get_num_threads(options.workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to build worker pool")?;

    pool.install(|| {
        missing.par_iter().for_each(|genome| {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return;
            }
            match compute_set(db, collection, genome) {
                Ok(vec) => {
                    let outcome = adder
                        .lock()
                        .expect("adder mutex poisoned")
                        .add(&vec, genome);
                    match outcome {
                        Ok(AddOutcome::Added(_)) => {
                            added.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(AddOutcome::AlreadyPresent) => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(
                                "Error storing k-mer set for genome \"{}\": {e:#}",
                                genome.description
                            );
                            errors.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Error finding k-mers for genome \"{}\": {e:#}",
                        genome.description
                    );
                    errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(sink) = progress {
                sink(finished);
            }
        });
    });

    let summary = BuildSummary {
        added: added.into_inner(),
        errors: errors.into_inner(),
        skipped: skipped.into_inner(),
    };
    info!(
        "Calculated {} sets, {} errors, {} already in collection",
        summary.added, summary.errors, summary.skipped
    );
    Ok(summary)
}
