//! The on-disk k-mer database: a directory holding a version stamp, the
//! relational catalog, stored genome blobs and per-collection k-mer set
//! files.
//!
//! ```text
//! .kmer-db                 version stamp, JSON {"version": N}
//! data.db                  catalog (SQLite)
//! genomes/                 genome blobs, named by sanitized key
//! kmer_collections/
//!     <collection-dir>/gen-<genome_id>.npy
//! ```
//!
//! Every compound operation follows the same try/compensate pattern:
//! perform the file-system effect, then the catalog insert, and reverse
//! the file-system effect if the insert fails.

pub mod catalog;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::KmerDbError;
use crate::kmer::KmerSpec;
use crate::store::{storage_format, KmerStorageFormat, SetFileMeta, StorageFormatKind};
use crate::utils::slugify;
use crate::vector::{DenseVector, KmerCoords};
use catalog::{Catalog, Compression, Genome, KmerCollection, KmerSetRow, NewGenome};

/// Database layout version this build reads and writes. Databases at
/// any other version are rejected until the migration tool has run.
pub const CURRENT_DB_VERSION: u32 = 5;

/// The presence of this file marks a directory as a k-mer database.
pub const INFO_FILE_NAME: &str = ".kmer-db";

/// Forcibly overrides the current database path.
pub const DB_PATH_OVERRIDE_VAR: &str = "KMERDB_PATH_OVERRIDE";

/// Default database path when no other rule selects one.
pub const DEFAULT_DB_PATH_VAR: &str = "KMERDB_DEFAULT_PATH";

const SQLITE_FILE: &str = "data.db";
const GENOMES_DIR: &str = "genomes";
const COLLECTIONS_DIR: &str = "kmer_collections";

/// Keys are truncated to this many characters before slugging.
const NAME_KEY_MAX: usize = 25;

#[derive(Debug, Serialize, Deserialize)]
struct DbInfo {
    version: u32,
}

/// Checks whether a directory contains a k-mer database.
pub fn is_db_directory(path: &Path) -> bool {
    path.join(INFO_FILE_NAME).is_file()
}

/// Reads the version stamp of a database directory.
pub fn db_version(path: &Path) -> Result<u32> {
    let info_path = path.join(INFO_FILE_NAME);
    if !info_path.is_file() {
        return Err(KmerDbError::NotADatabase(path.to_path_buf()).into());
    }
    let file =
        File::open(&info_path).with_context(|| format!("Failed to read {info_path:?}"))?;
    let info: DbInfo = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Malformed version stamp {info_path:?}"))?;
    Ok(info.version)
}

/// Walks from `start` upward looking for a database directory.
pub fn find_db_root(start: &Path) -> Option<PathBuf> {
    let mut path = start.to_path_buf();
    loop {
        if is_db_directory(&path) {
            return Some(path);
        }
        if !path.pop() {
            return None;
        }
    }
}

/// Options governing a genome import beyond the catalog columns.
#[derive(Debug, Clone, Default)]
pub struct GenomeImportOptions {
    /// Compression of the source file; transcoded when it differs from
    /// the target compression recorded in the genome row.
    pub src_compression: Compression,
    /// Copy the source instead of moving it.
    pub keep_src: bool,
    /// Genome sets (by name) to join at import time.
    pub genome_sets: Vec<String>,
}

/// Parameters for creating a k-mer collection.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    pub title: String,
    pub prefix: String,
    pub k: usize,
    pub format: StorageFormatKind,
    pub parameters: serde_json::Value,
}

/// Handle on one database directory. Cheap to clone; every method
/// opens its own catalog session.
#[derive(Debug, Clone)]
pub struct Database {
    directory: PathBuf,
}

impl Database {
    /// Opens an existing database, rejecting version mismatches without
    /// touching any files.
    pub fn open(directory: &Path) -> Result<Self> {
        let directory = fs::canonicalize(directory)
            .with_context(|| format!("Cannot resolve database directory {directory:?}"))?;
        let version = db_version(&directory)?;
        if version != CURRENT_DB_VERSION {
            return Err(KmerDbError::VersionMismatch {
                path: directory,
                found: version,
                expected: CURRENT_DB_VERSION,
            }
            .into());
        }
        Ok(Database { directory })
    }

    /// Creates a fresh database: directory tree, version stamp, catalog
    /// schema and the recorded schema revision.
    pub fn create(directory: &Path, overwrite: bool) -> Result<Self> {
        if !directory.exists() {
            fs::create_dir_all(directory)
                .with_context(|| format!("Failed to create {directory:?}"))?;
        } else if overwrite {
            for name in [INFO_FILE_NAME, SQLITE_FILE] {
                let path = directory.join(name);
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
            for name in [GENOMES_DIR, COLLECTIONS_DIR] {
                let path = directory.join(name);
                if path.exists() {
                    fs::remove_dir_all(&path)?;
                }
            }
        } else if directory.read_dir()?.next().is_some() {
            return Err(KmerDbError::DirectoryNotEmpty(directory.to_path_buf()).into());
        }

        let directory = fs::canonicalize(directory)?;
        let info = DbInfo {
            version: CURRENT_DB_VERSION,
        };
        let info_path = directory.join(INFO_FILE_NAME);
        serde_json::to_writer(
            File::create(&info_path).with_context(|| format!("Failed to write {info_path:?}"))?,
            &info,
        )?;
        fs::create_dir(directory.join(GENOMES_DIR))?;
        fs::create_dir(directory.join(COLLECTIONS_DIR))?;
        Catalog::create(&directory.join(SQLITE_FILE))?;
        info!(
            "Created k-mer database (version {}) at {:?}",
            CURRENT_DB_VERSION, directory
        );
        Ok(Database { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Opens a writable catalog session.
    pub fn catalog(&self) -> Result<Catalog> {
        Ok(Catalog::open(&self.directory.join(SQLITE_FILE))?)
    }

    /// Opens a read-only catalog session, as used by query workers.
    pub fn catalog_read_only(&self) -> Result<Catalog> {
        Ok(Catalog::open_read_only(&self.directory.join(SQLITE_FILE))?)
    }

    fn genomes_dir(&self) -> PathBuf {
        self.directory.join(GENOMES_DIR)
    }

    fn collection_dir(&self, collection: &KmerCollection) -> PathBuf {
        self.directory.join(COLLECTIONS_DIR).join(&collection.directory)
    }

    pub fn genome_path(&self, genome: &Genome) -> PathBuf {
        self.genomes_dir().join(&genome.filename)
    }

    /// Opens a genome blob for reading, decompressing transparently.
    pub fn open_genome(&self, genome: &Genome) -> Result<Box<dyn Read + Send>> {
        let path = self.genome_path(genome);
        let file =
            File::open(&path).with_context(|| format!("Failed to open genome blob {path:?}"))?;
        Ok(match genome.compression {
            Compression::None => Box::new(BufReader::new(file)),
            Compression::Gzip => Box::new(MultiGzDecoder::new(BufReader::new(file))),
        })
    }

    /// Imports a genome: stores the blob under a derived name, then
    /// inserts the catalog row, undoing the file operation if the
    /// insert fails.
    pub fn store_genome(
        &self,
        source: &Path,
        new: &NewGenome,
        options: &GenomeImportOptions,
    ) -> Result<Genome> {
        let catalog = self.catalog()?;

        if catalog.genome_by_description(&new.description)?.is_some() {
            return Err(KmerDbError::DuplicateGenomeDescription(new.description.clone()).into());
        }

        // Resolve set memberships up front so a bad name fails before
        // any file moves.
        let mut set_ids = Vec::new();
        for name in &options.genome_sets {
            let set = catalog
                .genome_set_by_name(name)?
                .ok_or_else(|| KmerDbError::GenomeSetNotFound(name.clone()))?;
            set_ids.push(set.id);
        }

        let filename = self.make_genome_file_name(&catalog, new)?;
        let store_path = self.genomes_dir().join(&filename);
        if store_path.exists() {
            return Err(KmerDbError::DestinationExists(store_path).into());
        }

        // File-system half of the import.
        let src_moved = if new.compression == options.src_compression {
            if options.keep_src {
                fs::copy(source, &store_path)
                    .with_context(|| format!("Failed to copy {source:?} to {store_path:?}"))?;
                false
            } else {
                fs::rename(source, &store_path)
                    .with_context(|| format!("Failed to move {source:?} to {store_path:?}"))?;
                true
            }
        } else {
            transcode(source, &store_path, options.src_compression, new.compression)?;
            false
        };

        // Catalog half; reverse the file operation on failure.
        let stored = (|| -> Result<Genome> {
            let genome = catalog.insert_genome(new, &filename)?;
            for set_id in &set_ids {
                catalog.add_genome_to_set(*set_id, genome.id)?;
            }
            Ok(genome)
        })();

        match stored {
            Ok(genome) => {
                // A transcoded move deletes the source only once
                // everything else has succeeded.
                if !options.keep_src && !src_moved {
                    fs::remove_file(source).with_context(|| {
                        format!("Imported {source:?} but failed to remove the original")
                    })?;
                }
                info!(
                    "Imported genome {} as {:?}",
                    genome.description, genome.filename
                );
                Ok(genome)
            }
            Err(e) => {
                if src_moved {
                    let _ = fs::rename(&store_path, source);
                } else {
                    let _ = fs::remove_file(&store_path);
                }
                Err(e)
            }
        }
    }

    /// Removes a genome: blob first (if present), then the row.
    pub fn remove_genome(&self, genome: &Genome) -> Result<()> {
        let path = self.genome_path(genome);
        if path.is_file() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove genome blob {path:?}"))?;
        }
        self.catalog()?.delete_genome(genome.id)?;
        info!("Removed genome {} ({:?})", genome.description, genome.filename);
        Ok(())
    }

    /// Creates a k-mer collection: directory first, then the row,
    /// removing the directory if the insert fails.
    pub fn create_kmer_collection(&self, options: &CollectionOptions) -> Result<KmerCollection> {
        let title = options.title.trim();
        if title.is_empty() {
            return Err(anyhow::anyhow!("Collection title cannot be empty"));
        }
        if options.prefix.is_empty() {
            return Err(KmerDbError::EmptyPrefix.into());
        }
        // Validates k / prefix bounds as a side effect.
        let spec = KmerSpec::new(options.k, &options.prefix)?;

        let catalog = self.catalog()?;
        if catalog.collection_by_title(title)?.is_some() {
            return Err(KmerDbError::DuplicateCollectionTitle(title.to_string()).into());
        }

        let dirname = self.make_collection_dirname(&catalog, title)?;
        let dir_path = self.directory.join(COLLECTIONS_DIR).join(&dirname);
        fs::create_dir(&dir_path)
            .with_context(|| format!("Failed to create collection directory {dir_path:?}"))?;

        let inserted = catalog.insert_collection(
            title,
            &dirname,
            spec.prefix_str(),
            options.k,
            &options.parameters,
            options.format,
        );
        match inserted {
            Ok(collection) => {
                info!(
                    "Created k-mer collection {:?} (k={}, prefix={}, format={})",
                    collection.title, collection.k, collection.prefix, collection.format
                );
                Ok(collection)
            }
            Err(e) => {
                let _ = fs::remove_dir(&dir_path);
                Err(e.into())
            }
        }
    }

    /// Deletes a collection, its directory of set files and (by
    /// cascade) its k-mer set rows.
    pub fn remove_kmer_collection(&self, collection: &KmerCollection) -> Result<()> {
        let dir_path = self.collection_dir(collection);
        if dir_path.is_dir() {
            fs::remove_dir_all(&dir_path)
                .with_context(|| format!("Failed to remove {dir_path:?}"))?;
        }
        self.catalog()?.delete_collection(collection.id)?;
        info!("Removed k-mer collection {:?}", collection.title);
        Ok(())
    }

    /// Builds an adder that writes k-mer set files into a collection.
    pub fn set_adder(&self, collection: &KmerCollection) -> Result<KmerSetAdder> {
        let spec = collection.spec()?;
        Ok(KmerSetAdder {
            db: self.clone(),
            collection_id: collection.id,
            collection_dir: self.collection_dir(collection),
            format: storage_format(collection.format, &spec),
        })
    }

    /// Builds a loader for a collection's set files. Loaders carry no
    /// catalog session, so each query worker can own one.
    pub fn set_loader(&self, collection: &KmerCollection) -> Result<KmerSetLoader> {
        let spec = collection.spec()?;
        Ok(KmerSetLoader {
            collection_id: collection.id,
            collection_dir: self.collection_dir(collection),
            format: storage_format(collection.format, &spec),
        })
    }

    /// Derives the stored file name for a genome: the accession when
    /// present, otherwise the description; truncated, slug-sanitized,
    /// extension from format and compression, and a numeric suffix
    /// (before the extension) on collision.
    fn make_genome_file_name(&self, catalog: &Catalog, new: &NewGenome) -> Result<String> {
        let key = new.gb_acc.as_deref().unwrap_or(&new.description);
        let key: String = key.chars().take(NAME_KEY_MAX).collect();
        let base = slugify(&key);
        let mut ext = format!(".{}", new.file_format);
        if new.compression == Compression::Gzip {
            ext.push_str(".gz");
        }

        let mut filename = format!("{base}{ext}");
        let mut i = 0;
        while catalog.genome_filename_exists(&filename)?
            || self.genomes_dir().join(&filename).exists()
        {
            i += 1;
            filename = format!("{base}_{i}{ext}");
        }
        Ok(filename)
    }

    /// Collection directory names follow the same rule from the title,
    /// lower-cased and without an extension.
    fn make_collection_dirname(&self, catalog: &Catalog, title: &str) -> Result<String> {
        let key: String = title.chars().take(NAME_KEY_MAX).collect();
        let base = slugify(&key).to_lowercase();
        let mut dirname = base.clone();
        let mut i = 0;
        while catalog.collection_directory_exists(&dirname)? {
            i += 1;
            dirname = format!("{base}_{i}");
        }
        Ok(dirname)
    }
}

/// Re-encodes a blob between compression formats while copying.
fn transcode(source: &Path, dest: &Path, from: Compression, to: Compression) -> Result<()> {
    let src_file =
        File::open(source).with_context(|| format!("Failed to open source {source:?}"))?;
    let mut reader: Box<dyn Read> = match from {
        Compression::None => Box::new(BufReader::new(src_file)),
        Compression::Gzip => Box::new(MultiGzDecoder::new(BufReader::new(src_file))),
    };
    let dest_file =
        File::create(dest).with_context(|| format!("Failed to create destination {dest:?}"))?;
    let result = (|| -> Result<()> {
        match to {
            Compression::None => {
                let mut writer = BufWriter::new(dest_file);
                std::io::copy(&mut reader, &mut writer)?;
                writer.flush()?;
            }
            Compression::Gzip => {
                let mut writer = GzEncoder::new(BufWriter::new(dest_file), Default::default());
                std::io::copy(&mut reader, &mut writer)?;
                writer.finish()?.flush()?;
            }
        }
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result.with_context(|| format!("Failed to transcode {source:?} to {dest:?}"))
}

/// Writes computed k-mer sets into one collection. The file write and
/// the row insert go together; the file is unlinked if the insert
/// fails. Adding is idempotent per `(collection, genome)`: an existing
/// pair is reported as skipped.
pub struct KmerSetAdder {
    db: Database,
    collection_id: i64,
    collection_dir: PathBuf,
    format: Box<dyn KmerStorageFormat>,
}

/// Outcome of one [`KmerSetAdder::add`] call.
#[derive(Debug)]
pub enum AddOutcome {
    Added(KmerSetRow),
    AlreadyPresent,
}

impl KmerSetAdder {
    pub fn add(&self, vec: &DenseVector, genome: &Genome) -> Result<AddOutcome> {
        let catalog = self.db.catalog()?;
        if catalog.kmer_set_exists(self.collection_id, genome.id)? {
            debug!(
                "K-mer set for genome {} already present in collection {}",
                genome.id, self.collection_id
            );
            return Ok(AddOutcome::AlreadyPresent);
        }

        let filename = format!("gen-{}.npy", genome.id);
        let path = self.collection_dir.join(&filename);
        let row = KmerSetRow {
            collection_id: self.collection_id,
            genome_id: genome.id,
            dtype: vec.element_type(),
            has_counts: vec.has_counts(),
            count: vec.nonzero_count(),
            filename,
            extra: None,
        };
        let meta = SetFileMeta {
            element_type: row.dtype,
            has_counts: row.has_counts,
        };

        let mut writer = BufWriter::new(
            File::create(&path).with_context(|| format!("Failed to create {path:?}"))?,
        );
        self.format
            .store(&mut writer, vec, &meta)
            .and_then(|()| writer.flush().map_err(Into::into))
            .with_context(|| format!("Failed to write k-mer set file {path:?}"))?;

        match catalog.insert_kmer_set(&row) {
            Ok(()) => Ok(AddOutcome::Added(row)),
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(e.into())
            }
        }
    }
}

/// Loads k-mer set vectors from one collection's directory. Holds the
/// storage format but no catalog session, so construction is done once
/// and instances can live on worker threads.
pub struct KmerSetLoader {
    collection_id: i64,
    collection_dir: PathBuf,
    format: Box<dyn KmerStorageFormat>,
}

impl KmerSetLoader {
    fn path_for(&self, set: &KmerSetRow) -> Result<PathBuf> {
        if set.collection_id != self.collection_id {
            return Err(KmerDbError::CollectionNotFound(set.collection_id).into());
        }
        Ok(self.collection_dir.join(&set.filename))
    }

    fn meta_for(set: &KmerSetRow) -> SetFileMeta {
        SetFileMeta {
            element_type: set.dtype,
            has_counts: set.has_counts,
        }
    }

    /// Loads the dense vector exactly as stored.
    pub fn load(&self, set: &KmerSetRow) -> Result<DenseVector> {
        let path = self.path_for(set)?;
        let mut reader = BufReader::new(
            File::open(&path).with_context(|| format!("Failed to open k-mer set file {path:?}"))?,
        );
        self.format
            .load(&mut reader, &Self::meta_for(set))
            .with_context(|| format!("Failed to load k-mer set file {path:?}"))
    }

    /// Loads the coordinate form without materializing the dense vector
    /// when the format allows it. With `want_counts` a counts row of
    /// ones is attached for presence-only sets.
    pub fn load_coords(&self, set: &KmerSetRow, want_counts: bool) -> Result<KmerCoords> {
        let path = self.path_for(set)?;
        let mut reader = BufReader::new(
            File::open(&path).with_context(|| format!("Failed to open k-mer set file {path:?}"))?,
        );
        let coords = self
            .format
            .load_coords(&mut reader, &Self::meta_for(set))
            .with_context(|| format!("Failed to load k-mer set file {path:?}"))?;

        let coords = match (want_counts, coords.counts().is_some()) {
            (true, false) => {
                let ones = vec![1u32; coords.len()];
                KmerCoords::new(coords.indices().to_vec(), Some(ones))
            }
            (false, true) => KmerCoords::new(coords.indices().to_vec(), None),
            _ => coords,
        };
        Ok(coords)
    }
}

/// Convenience used by commands working on "the current database".
pub fn describe_source(source: DbSource) -> &'static str {
    match source {
        DbSource::Override => "environment override",
        DbSource::WorkingDir => "working directory",
        DbSource::Registry => "registered default",
        DbSource::Environment => "default environment variable",
    }
}

/// Where the current database path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbSource {
    Override,
    WorkingDir,
    Registry,
    Environment,
}
