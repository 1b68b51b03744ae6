//! The reference-set builder command.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::builder::{build_reference_sets, BuildOptions};
use crate::cli::CalcArgs;
use crate::utils::progress_bar;

use super::open_current_db;

pub fn run_calc(args: CalcArgs, threads: usize, db_flag: &Option<PathBuf>) -> Result<()> {
    let db = open_current_db(db_flag)?;
    let collection = db.catalog()?.collection(args.collection_id)?;

    let progress = if args.progress {
        let missing = db
            .catalog()?
            .genomes_without_set(collection.id)?
            .len() as u64;
        let bar = progress_bar(missing, "Calculating k-mer sets");
        let sink: crate::query::ProgressSink = Box::new(move |done| bar.set_position(done));
        Some(sink)
    } else {
        None
    };

    let summary = build_reference_sets(
        &db,
        &collection,
        &BuildOptions {
            workers: threads,
            progress,
            cancel: None,
        },
    )?;

    println!(
        "Calculated {} sets, {} errors, {} already in collection",
        summary.added, summary.errors, summary.skipped
    );
    if summary.errors > 0 && summary.added == 0 {
        bail!("Every genome in the batch failed");
    }
    Ok(())
}
