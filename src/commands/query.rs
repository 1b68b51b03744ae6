//! Query sequences against a reference collection and rank the matches.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;

use crate::cli::QueryArgs;
use crate::db::catalog::Genome;
use crate::genbank::record_url;
use crate::metrics::metric_keys;
use crate::parse::{find_seq_files, vec_from_records, FastxRecords, VectorizeOptions};
use crate::query::{query_collection, top_matches, QueryMatch, QueryOptions};
use crate::utils::progress_bar;
use crate::vector::{vec_to_coords, KmerCoords};

use super::open_current_db;

pub fn run_query(args: QueryArgs, threads: usize, db_flag: &Option<PathBuf>) -> Result<()> {
    let db = open_current_db(db_flag)?;
    // Queries never write; keep the catalog session read-only.
    let catalog = db.catalog_read_only()?;
    let collection = catalog.collection(args.collection_id)?;
    let spec = collection.spec()?;

    // Query files: one vector per file.
    let query_files: Vec<PathBuf> = if args.src.is_dir() {
        let files = find_seq_files(&args.src)?;
        if files.is_empty() {
            bail!("No sequence files found in {:?}", args.src);
        }
        files.into_iter().map(|info| info.path).collect()
    } else {
        vec![args.src.clone()]
    };

    info!(
        "Vectorizing {} query file(s) against collection \"{}\"",
        query_files.len(),
        collection.title
    );
    let vectorize = VectorizeOptions {
        quality_threshold: args.q_threshold,
        count_threshold: Some(args.c_threshold),
        ..VectorizeOptions::default()
    };
    let mut queries: Vec<KmerCoords> = Vec::with_capacity(query_files.len());
    for path in &query_files {
        let records = FastxRecords::from_path(path)?;
        let vec = vec_from_records(records, &spec, &vectorize)
            .with_context(|| format!("Failed to vectorize query file {path:?}"))?;
        queries.push(vec_to_coords(&vec, false));
    }

    // Reference rows in deterministic order, with their genomes for the
    // output columns.
    let ref_sets = catalog.kmer_sets_for_collection(collection.id)?;
    if ref_sets.is_empty() {
        bail!(
            "Collection \"{}\" has no computed k-mer sets; run calc first",
            collection.title
        );
    }
    let genomes: Vec<Genome> = ref_sets
        .iter()
        .map(|set| catalog.genome(set.genome_id))
        .collect::<Result<_, _>>()?;

    let metrics = if args.metric == "all" {
        metric_keys().into_iter().map(String::from).collect()
    } else {
        vec![args.metric.clone()]
    };

    let progress = args.progress.then(|| {
        let bar = progress_bar(ref_sets.len() as u64, "Querying reference database");
        let sink: crate::query::ProgressSink = Box::new(move |done| bar.set_position(done));
        sink
    });

    let result = query_collection(
        &db,
        &collection,
        &ref_sets,
        &queries,
        &QueryOptions {
            metrics,
            workers: threads,
            progress,
            cancel: None,
        },
    )?;
    if result.completed == 0 {
        bail!("No reference sets could be scored");
    }

    let matches = top_matches(&result, args.n_results);

    if !args.no_print {
        print_matches(&matches, &query_files, &genomes, args.n_results);
    }
    if let Some(csv_path) = &args.csv {
        write_csv(csv_path, &matches, &query_files, &genomes, &catalog)?;
        info!("Wrote ranked matches to {csv_path:?}");
    }
    Ok(())
}

fn print_matches(
    matches: &[QueryMatch],
    query_files: &[PathBuf],
    genomes: &[Genome],
    top_n: usize,
) {
    let mut current: Option<(usize, &str)> = None;
    for m in matches {
        let header = (m.query, m.metric.key);
        if current != Some(header) {
            if current.map(|(q, _)| q) != Some(m.query) {
                println!("\n>{}", query_files[m.query].display());
            }
            println!("\nTop {} scores by {}:", top_n, m.metric.title);
            current = Some(header);
        }
        println!("{} {}", m.score, genomes[m.ref_index].description);
    }
}

/// The external-archive link for a genome: accession preferred, numeric
/// id as fallback, nothing when no archive is recorded.
fn genome_link(genome: &Genome) -> Option<String> {
    let db = genome.gb_db.as_deref()?;
    if let Some(acc) = &genome.gb_acc {
        Some(record_url(db, acc))
    } else {
        genome.gb_id.map(|id| record_url(db, &id.to_string()))
    }
}

fn write_csv(
    path: &Path,
    matches: &[QueryMatch],
    query_files: &[PathBuf],
    genomes: &[Genome],
    catalog: &crate::db::catalog::Catalog,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {path:?}"))?;
    writer.write_record([
        "query_file",
        "metric",
        "rank",
        "score",
        "description",
        "organism",
        "genus",
        "species",
        "strain",
        "set",
        "accession",
        "database",
        "link",
    ])?;

    for m in matches {
        let genome = &genomes[m.ref_index];
        let set_name = catalog.first_set_name_for_genome(genome.id)?;
        writer.write_record([
            query_files[m.query].display().to_string(),
            m.metric.title.to_string(),
            m.rank.to_string(),
            m.score.to_string(),
            genome.description.clone(),
            genome.organism.clone().unwrap_or_default(),
            genome.tax_genus.clone().unwrap_or_default(),
            genome.tax_species.clone().unwrap_or_default(),
            genome.tax_strain.clone().unwrap_or_default(),
            set_name.unwrap_or_default(),
            genome.gb_acc.clone().unwrap_or_default(),
            genome.gb_db.clone().unwrap_or_default(),
            genome_link(genome).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
