use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KmerDbError {
    // Configuration errors: reported to the caller, never retried.
    #[error("Invalid k-mer length {0}. Must be at least 1.")]
    InvalidK(usize),

    #[error("Invalid prefix {0:?}. Prefixes may only contain A, C, G and T.")]
    InvalidPrefix(String),

    #[error("Prefix {prefix:?} has length {plen}, which must be less than k = {k}")]
    PrefixTooLong {
        prefix: String,
        plen: usize,
        k: usize,
    },

    #[error("Prefix cannot be empty")]
    EmptyPrefix,

    #[error("Unknown storage format {0:?}")]
    UnknownStorageFormat(String),

    #[error("Unknown compression format {0:?}")]
    UnknownCompression(String),

    #[error("Unknown vector element type {0:?}")]
    UnknownElementType(String),

    #[error("Unknown query metric {0:?}")]
    UnknownMetric(String),

    #[error("A k-mer collection titled {0:?} already exists")]
    DuplicateCollectionTitle(String),

    #[error("A genome described as {0:?} already exists")]
    DuplicateGenomeDescription(String),

    #[error("A genome set named {0:?} already exists")]
    DuplicateGenomeSetName(String),

    // Not-found errors.
    #[error("No k-mer collection with id {0}")]
    CollectionNotFound(i64),

    #[error("No genome with id {0}")]
    GenomeNotFound(i64),

    #[error("No genome set named {0:?}")]
    GenomeSetNotFound(String),

    #[error("No database registered under the name {0:?}")]
    DatabaseNotRegistered(String),

    #[error("No k-mer database found (set KMERDB_PATH_OVERRIDE, run inside a database directory, or register a default)")]
    NoCurrentDatabase,

    // I/O and layout errors.
    #[error("{0:?} does not contain a k-mer database")]
    NotADatabase(PathBuf),

    #[error("Database at {path:?} has version {found} but this build requires version {expected}; run the migration tool first")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("{0:?} exists and is not empty")]
    DirectoryNotEmpty(PathBuf),

    #[error("{0:?} already exists")]
    DestinationExists(PathBuf),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Catalog error")]
    Catalog(#[from] rusqlite::Error),

    // Data errors.
    #[error("Count overflow at k-mer index {index}: exceeds the {dtype} element type")]
    CountOverflow { index: u64, dtype: &'static str },

    #[error("Length mismatch: vector has {found} slots but the collection spec indexes {expected}")]
    VectorLengthMismatch { found: usize, expected: usize },

    #[error("Quality scores have length {qual} but the sequence has length {seq}")]
    QualityLengthMismatch { qual: usize, seq: usize },
}

pub type Result<T, E = KmerDbError> = std::result::Result<T, E>;
