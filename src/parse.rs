//! Sequence-record streams and the record-stream -> k-mer-vector driver.
//!
//! Parsing itself is needletail's job; this module adapts its streaming
//! reader into an owned-record iterator, infers formats from file names
//! for catalog metadata, and accumulates whole record streams into one
//! dense vector.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use needletail::parser::FastxReader;
use needletail::{parse_fastx_file, parse_fastx_reader};

use crate::kmer::{FindOptions, KmerSpec};
use crate::vector::{bool_vec, counts_vec, DenseVector, ElementType};

/// PHRED scores are carried in FASTQ as printable ASCII with this offset.
const PHRED_OFFSET: u8 = 33;

/// One parsed sequence record: bases plus optional per-base PHRED scores.
#[derive(Debug, Clone)]
pub struct SequenceRecord {
    pub id: String,
    pub bases: Vec<u8>,
    pub phred: Option<Vec<u8>>,
}

/// Lazy iterator of owned records over any FASTA/FASTQ source
/// (needletail handles format and compression sniffing).
pub struct FastxRecords {
    reader: Box<dyn FastxReader>,
}

impl FastxRecords {
    pub fn from_path(path: &Path) -> Result<Self> {
        let reader = parse_fastx_file(path)
            .with_context(|| format!("Failed to open or parse sequence file {path:?}"))?;
        Ok(FastxRecords { reader })
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Result<Self> {
        let reader = parse_fastx_reader(reader).context("Failed to parse sequence stream")?;
        Ok(FastxRecords { reader })
    }
}

impl Iterator for FastxRecords {
    type Item = Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.reader.next()? {
            Ok(r) => r,
            Err(e) => return Some(Err(e).context("Error reading sequence record")),
        };
        Some(Ok(SequenceRecord {
            id: String::from_utf8_lossy(record.id()).into_owned(),
            bases: record.seq().into_owned(),
            phred: record
                .qual()
                .map(|q| q.iter().map(|&b| b.saturating_sub(PHRED_OFFSET)).collect()),
        }))
    }
}

/// Mapping from file extension to sequence format tag.
const SEQ_FILE_EXTS: &[(&str, &str)] = &[
    ("fasta", "fasta"),
    ("fna", "fasta"),
    ("fas", "fasta"),
    ("ffn", "fasta"),
    ("fastq", "fastq"),
    ("fq", "fastq"),
];

/// What a file name says about a sequence file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqFileInfo {
    pub path: PathBuf,
    pub format: Option<&'static str>,
    pub gzip: bool,
}

/// Infers format and compression from a file name alone.
pub fn inspect_seq_file(path: &Path) -> SeqFileInfo {
    let name = path.file_name().map(|n| n.to_string_lossy().to_string());
    let mut stem = name.unwrap_or_default();
    let mut gzip = false;
    if let Some(s) = stem.strip_suffix(".gz") {
        gzip = true;
        stem = s.to_string();
    }
    let format = stem.rsplit('.').next().and_then(|ext| {
        SEQ_FILE_EXTS
            .iter()
            .find(|(e, _)| ext.eq_ignore_ascii_case(e))
            .map(|&(_, fmt)| fmt)
    });
    SeqFileInfo {
        path: path.to_path_buf(),
        format,
        gzip,
    }
}

/// Finds sequence files in a directory, filtered by known extensions and
/// sorted by name so downstream ordering is deterministic.
pub fn find_seq_files(directory: &Path) -> Result<Vec<SeqFileInfo>> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(directory)
        .with_context(|| format!("Failed to list directory {directory:?}"))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let info = inspect_seq_file(&entry.path());
        if info.format.is_some() {
            files.push(info);
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Options for the record-stream vectorizer.
#[derive(Debug, Clone)]
pub struct VectorizeOptions {
    /// Drop k-mers whose window contains a PHRED score below this.
    pub quality_threshold: Option<u8>,
    /// After accumulation, keep only slots with at least this count
    /// (the result is then a presence vector).
    pub count_threshold: Option<u32>,
    /// Produce a count vector instead of a presence vector.
    pub counts: bool,
    /// Element type used when counting.
    pub count_dtype: ElementType,
}

impl Default for VectorizeOptions {
    fn default() -> Self {
        VectorizeOptions {
            quality_threshold: None,
            count_threshold: None,
            counts: false,
            count_dtype: ElementType::U16,
        }
    }
}

/// Accumulates every record of a stream into one dense vector: boolean
/// OR across records, or summed counts. A count threshold is applied
/// once after the whole stream has accumulated, never per record.
pub fn vec_from_records(
    records: impl Iterator<Item = Result<SequenceRecord>>,
    spec: &KmerSpec,
    opts: &VectorizeOptions,
) -> Result<DenseVector> {
    let needs_counts = opts.counts || opts.count_threshold.is_some();
    let idx_len = spec.idx_len();
    let mut acc = if needs_counts {
        DenseVector::zeros(opts.count_dtype, idx_len as usize)
    } else {
        DenseVector::zeros(ElementType::Bool, idx_len as usize)
    };

    let find_opts = FindOptions::default();
    for record in records {
        let record = record?;
        let indices: Vec<u64> = match (opts.quality_threshold, &record.phred) {
            (Some(threshold), Some(phred)) => spec
                .find_quality(&record.bases, phred, threshold, find_opts)?
                .collect(),
            _ => spec.find(&record.bases, find_opts).collect(),
        };
        acc = if needs_counts {
            counts_vec(indices, idx_len, opts.count_dtype, Some(acc))?
        } else {
            bool_vec(indices, idx_len, Some(acc))?
        };
    }

    match opts.count_threshold {
        Some(threshold) if threshold > 0 => Ok(acc.threshold(threshold)),
        _ => Ok(acc),
    }
}
