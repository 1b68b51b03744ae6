//! Stand-alone k-mer finder: enumerate k-mers in sequence files and
//! write one of several summaries, no database involved.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, warn};

use crate::cli::{FindArgs, FindOutput};
use crate::kmer::{kmer_at_index, FindOptions, KmerSpec};
use crate::parse::{find_seq_files, FastxRecords};
use crate::utils::progress_bar;
use crate::vector::{bool_vec, DenseVector};

/// Occurrences of each suffix index across a whole file.
fn count_kmers(
    records: FastxRecords,
    spec: &KmerSpec,
    threshold: Option<u8>,
) -> Result<BTreeMap<u64, u64>> {
    let mut counts = BTreeMap::new();
    let opts = FindOptions::default();
    for record in records {
        let record = record?;
        let indices: Box<dyn Iterator<Item = u64>> = match (threshold, &record.phred) {
            (Some(t), Some(phred)) => {
                Box::new(spec.find_quality(&record.bases, phred, t, opts)?)
            }
            // FASTA input has no scores to filter on.
            _ => Box::new(spec.find(&record.bases, opts)),
        };
        for index in indices {
            *counts.entry(index).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

fn write_kmer_list(
    out: &mut dyn Write,
    counts: &BTreeMap<u64, u64>,
    suffix_len: usize,
) -> Result<()> {
    // BTreeMap iteration is index order, which is lexicographic suffix
    // order.
    for &index in counts.keys() {
        out.write_all(&kmer_at_index(index, suffix_len))?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn write_kmer_counts(
    out: &mut dyn Write,
    counts: &BTreeMap<u64, u64>,
    suffix_len: usize,
) -> Result<()> {
    let mut entries: Vec<(&u64, &u64)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (&index, &count) in entries {
        out.write_all(&kmer_at_index(index, suffix_len))?;
        writeln!(out, " {count}")?;
    }
    Ok(())
}

fn write_kmer_hist(out: &mut dyn Write, counts: &BTreeMap<u64, u64>) -> Result<()> {
    let mut hist: BTreeMap<u64, u64> = BTreeMap::new();
    for &count in counts.values() {
        *hist.entry(count).or_insert(0) += 1;
    }
    for (count, kmers) in hist {
        writeln!(out, "{count} {kmers}")?;
    }
    Ok(())
}

/// One byte per slot over the whole index space, 1 where present.
fn write_kmer_vec(out: &mut dyn Write, counts: &BTreeMap<u64, u64>, spec: &KmerSpec) -> Result<()> {
    let vec = bool_vec(counts.keys().copied(), spec.idx_len(), None)?;
    match vec {
        DenseVector::Bool(v) => {
            let bytes: Vec<u8> = v.iter().map(|&b| u8::from(b)).collect();
            out.write_all(&bytes)?;
        }
        _ => unreachable!("bool_vec without an accumulator is boolean"),
    }
    Ok(())
}

fn output_extension(output: FindOutput, threshold: Option<u8>) -> String {
    let base = match output {
        FindOutput::List => ".kmers.txt",
        FindOutput::Counts => ".counts.txt",
        FindOutput::Hist => ".hist.txt",
        FindOutput::Bool => ".kmer_vec",
    };
    match threshold {
        Some(t) => format!("-t{t}{base}"),
        None => base.to_string(),
    }
}

/// Output path with the source file's stem, in `dest_dir`, with the
/// mode-specific extension.
fn make_dest_path(src: &Path, dest_dir: &Path, ext: &str) -> PathBuf {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest_dir.join(format!("{stem}{ext}"))
}

fn process_file(
    src: &Path,
    dest: Option<&Path>,
    spec: &KmerSpec,
    args: &FindArgs,
) -> Result<()> {
    debug!("Processing source file {src:?}");
    let records = FastxRecords::from_path(src)?;
    let counts = count_kmers(records, spec, args.threshold)?;
    debug!("Found {} distinct k-mers in {src:?}", counts.len());

    let mut out: Box<dyn Write> = match dest {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {path:?}"))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    match args.output {
        FindOutput::List => write_kmer_list(&mut out, &counts, spec.suffix_len())?,
        FindOutput::Counts => write_kmer_counts(&mut out, &counts, spec.suffix_len())?,
        FindOutput::Hist => write_kmer_hist(&mut out, &counts)?,
        FindOutput::Bool => write_kmer_vec(&mut out, &counts, spec)?,
    }
    out.flush()?;
    Ok(())
}

pub fn run_find(args: FindArgs) -> Result<()> {
    // The stand-alone finder accepts an empty prefix (scan every
    // window); collection creation is stricter.
    let spec = KmerSpec::new(args.k, &args.prefix)?;
    let ext = output_extension(args.output, args.threshold);

    // Resolve (source, destination) pairs.
    let pairs: Vec<(PathBuf, Option<PathBuf>)> = if args.batch {
        let Some(dest_dir) = &args.dest else {
            bail!("A destination directory is required in batch mode");
        };
        let files = find_seq_files(&args.src)?;
        if files.is_empty() {
            bail!("No sequence files found in {:?}", args.src);
        }
        if !dest_dir.is_dir() {
            std::fs::create_dir_all(dest_dir)
                .with_context(|| format!("Failed to create {dest_dir:?}"))?;
        }
        files
            .into_iter()
            .map(|info| {
                let dest = make_dest_path(&info.path, dest_dir, &ext);
                (info.path, Some(dest))
            })
            .collect()
    } else {
        let dest = match &args.dest {
            Some(path) if path.is_dir() => Some(make_dest_path(&args.src, path, &ext)),
            Some(path) => Some(path.clone()),
            None => None,
        };
        vec![(args.src.clone(), dest)]
    };

    let bar = (args.batch && args.progress).then(|| progress_bar(pairs.len() as u64, "Finding k-mers"));

    let mut successes = 0usize;
    let mut failures = 0usize;
    for (src, dest) in &pairs {
        if let Some(dest) = dest {
            if dest.exists() && !args.overwrite {
                warn!("Refusing to overwrite {dest:?}");
                continue;
            }
        }
        match process_file(src, dest.as_deref(), &spec, &args) {
            Ok(()) => successes += 1,
            Err(e) if args.batch => {
                warn!("Error processing {src:?}: {e:#}");
                failures += 1;
            }
            Err(e) => return Err(e),
        }
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    if failures > 0 && successes == 0 {
        bail!("All {} input files failed", failures);
    }
    Ok(())
}
