//! Relational catalog of genomes, genome sets, k-mer collections and
//! k-mer sets, kept in SQLite next to the stored files.
//!
//! Rows with timestamp tracking carry `created_at`/`updated_at`; both
//! are stamped at insert and `updated_at` is refreshed by the explicit
//! `touch_*` update methods. JSON columns hold compact-serialized
//! `serde_json` values.

use std::path::Path;

use chrono::Utc;
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde_json::Value as Json;

use crate::errors::{KmerDbError, Result};
use crate::store::StorageFormatKind;
use crate::vector::ElementType;

/// Revision tag of the schema created by [`Catalog::create`]. The
/// external migration tool steps databases between revisions; this
/// crate only ever creates and opens the current one.
pub const SCHEMA_REVISION: &str = "8f3c41d6a902";

const SCHEMA: &str = r#"
CREATE TABLE genomes (
    id            INTEGER PRIMARY KEY,
    description   TEXT NOT NULL UNIQUE,
    organism      TEXT,
    gb_db         TEXT,
    gb_id         INTEGER UNIQUE,
    gb_acc        TEXT UNIQUE,
    gb_summary    TEXT,
    gb_taxid      INTEGER,
    tax_genus     TEXT,
    tax_species   TEXT,
    tax_strain    TEXT,
    filename      TEXT NOT NULL UNIQUE,
    file_format   TEXT NOT NULL,
    compression   TEXT NOT NULL DEFAULT 'none',
    is_assembled  INTEGER NOT NULL,
    extra         TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE genome_sets (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    extra       TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE genome_set_assoc (
    set_id    INTEGER NOT NULL REFERENCES genome_sets(id) ON DELETE CASCADE,
    genome_id INTEGER NOT NULL REFERENCES genomes(id) ON DELETE CASCADE,
    PRIMARY KEY (set_id, genome_id)
);

CREATE TABLE kmer_collections (
    id         INTEGER PRIMARY KEY,
    title      TEXT NOT NULL UNIQUE,
    directory  TEXT NOT NULL UNIQUE,
    prefix     TEXT NOT NULL,
    k          INTEGER NOT NULL,
    parameters TEXT NOT NULL,
    format     TEXT NOT NULL,
    extra      TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE kmer_sets (
    collection_id INTEGER NOT NULL REFERENCES kmer_collections(id) ON DELETE CASCADE,
    genome_id     INTEGER NOT NULL REFERENCES genomes(id) ON DELETE CASCADE,
    dtype         TEXT NOT NULL,
    has_counts    INTEGER NOT NULL,
    "count"       INTEGER NOT NULL,
    filename      TEXT NOT NULL,
    extra         TEXT,
    PRIMARY KEY (collection_id, genome_id)
);

CREATE TABLE schema_revisions (
    revision   TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#;

/// Compression of a stored genome blob; the closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            other => Err(KmerDbError::UnknownCompression(other.to_string())),
        }
    }
}

/// A reference genome row.
#[derive(Debug, Clone)]
pub struct Genome {
    pub id: i64,
    pub description: String,
    pub organism: Option<String>,
    pub gb_db: Option<String>,
    pub gb_id: Option<i64>,
    pub gb_acc: Option<String>,
    pub gb_summary: Option<Json>,
    pub gb_taxid: Option<i64>,
    pub tax_genus: Option<String>,
    pub tax_species: Option<String>,
    pub tax_strain: Option<String>,
    pub filename: String,
    pub file_format: String,
    pub compression: Compression,
    pub is_assembled: bool,
    pub extra: Option<Json>,
    pub created_at: String,
    pub updated_at: String,
}

/// Column values for a genome about to be imported (the file name is
/// derived by the database layer).
#[derive(Debug, Clone, Default)]
pub struct NewGenome {
    pub description: String,
    pub organism: Option<String>,
    pub gb_db: Option<String>,
    pub gb_id: Option<i64>,
    pub gb_acc: Option<String>,
    pub gb_summary: Option<Json>,
    pub gb_taxid: Option<i64>,
    pub tax_genus: Option<String>,
    pub tax_species: Option<String>,
    pub tax_strain: Option<String>,
    pub file_format: String,
    pub compression: Compression,
    pub is_assembled: bool,
    pub extra: Option<Json>,
}

/// A named set of genomes (many-to-many).
#[derive(Debug, Clone)]
pub struct GenomeSet {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub extra: Option<Json>,
    pub created_at: String,
    pub updated_at: String,
}

/// One `(k, prefix, format)` parameterization plus its directory of
/// per-genome set files.
#[derive(Debug, Clone)]
pub struct KmerCollection {
    pub id: i64,
    pub title: String,
    pub directory: String,
    pub prefix: String,
    pub k: usize,
    pub parameters: Json,
    pub format: StorageFormatKind,
    pub extra: Option<Json>,
    pub created_at: String,
    pub updated_at: String,
}

impl KmerCollection {
    pub fn spec(&self) -> Result<crate::kmer::KmerSpec> {
        crate::kmer::KmerSpec::new(self.k, &self.prefix)
    }
}

/// One genome's computed vector inside a collection.
#[derive(Debug, Clone)]
pub struct KmerSetRow {
    pub collection_id: i64,
    pub genome_id: i64,
    pub dtype: ElementType,
    pub has_counts: bool,
    pub count: u64,
    pub filename: String,
    pub extra: Option<Json>,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn json_to_sql(value: &Option<Json>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn json_from_sql(value: Option<String>) -> rusqlite::Result<Option<Json>> {
    value
        .map(|s| {
            serde_json::from_str(&s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

fn tag_from_sql<T>(
    parse: impl Fn(&str) -> Result<T>,
    value: String,
) -> rusqlite::Result<T> {
    parse(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

fn genome_from_row(row: &Row<'_>) -> rusqlite::Result<Genome> {
    Ok(Genome {
        id: row.get("id")?,
        description: row.get("description")?,
        organism: row.get("organism")?,
        gb_db: row.get("gb_db")?,
        gb_id: row.get("gb_id")?,
        gb_acc: row.get("gb_acc")?,
        gb_summary: json_from_sql(row.get("gb_summary")?)?,
        gb_taxid: row.get("gb_taxid")?,
        tax_genus: row.get("tax_genus")?,
        tax_species: row.get("tax_species")?,
        tax_strain: row.get("tax_strain")?,
        filename: row.get("filename")?,
        file_format: row.get("file_format")?,
        compression: tag_from_sql(Compression::parse, row.get("compression")?)?,
        is_assembled: row.get("is_assembled")?,
        extra: json_from_sql(row.get("extra")?)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn genome_set_from_row(row: &Row<'_>) -> rusqlite::Result<GenomeSet> {
    Ok(GenomeSet {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        extra: json_from_sql(row.get("extra")?)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<KmerCollection> {
    Ok(KmerCollection {
        id: row.get("id")?,
        title: row.get("title")?,
        directory: row.get("directory")?,
        prefix: row.get("prefix")?,
        k: row.get::<_, i64>("k")? as usize,
        parameters: json_from_sql(row.get("parameters")?)?.unwrap_or(Json::Null),
        format: tag_from_sql(StorageFormatKind::parse, row.get("format")?)?,
        extra: json_from_sql(row.get("extra")?)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn kmer_set_from_row(row: &Row<'_>) -> rusqlite::Result<KmerSetRow> {
    Ok(KmerSetRow {
        collection_id: row.get("collection_id")?,
        genome_id: row.get("genome_id")?,
        dtype: tag_from_sql(ElementType::parse, row.get("dtype")?)?,
        has_counts: row.get("has_counts")?,
        count: row.get::<_, i64>("count")? as u64,
        filename: row.get("filename")?,
        extra: json_from_sql(row.get("extra")?)?,
    })
}

/// Handle on the catalog. One writable session is used at a time; query
/// workers open their own read-only sessions.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Catalog { conn })
    }

    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Catalog { conn })
    }

    /// Creates the schema and records the current revision for the
    /// migration tool.
    pub fn create(path: &Path) -> Result<Self> {
        let catalog = Catalog::open(path)?;
        catalog.conn.execute_batch(SCHEMA)?;
        catalog.conn.execute(
            "INSERT INTO schema_revisions (revision, applied_at) VALUES (?1, ?2)",
            params![SCHEMA_REVISION, now()],
        )?;
        debug!("Created catalog schema at revision {}", SCHEMA_REVISION);
        Ok(catalog)
    }

    pub fn schema_revision(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT revision FROM schema_revisions ORDER BY rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    // Genomes.

    pub fn insert_genome(&self, new: &NewGenome, filename: &str) -> Result<Genome> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO genomes (description, organism, gb_db, gb_id, gb_acc, gb_summary, \
             gb_taxid, tax_genus, tax_species, tax_strain, filename, file_format, compression, \
             is_assembled, extra, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
            params![
                new.description,
                new.organism,
                new.gb_db,
                new.gb_id,
                new.gb_acc,
                json_to_sql(&new.gb_summary),
                new.gb_taxid,
                new.tax_genus,
                new.tax_species,
                new.tax_strain,
                filename,
                new.file_format,
                new.compression.as_str(),
                new.is_assembled,
                json_to_sql(&new.extra),
                ts,
            ],
        )?;
        self.genome(self.conn.last_insert_rowid())
    }

    pub fn genome(&self, id: i64) -> Result<Genome> {
        self.conn
            .query_row("SELECT * FROM genomes WHERE id = ?1", [id], genome_from_row)
            .optional()?
            .ok_or(KmerDbError::GenomeNotFound(id))
    }

    pub fn genome_by_description(&self, description: &str) -> Result<Option<Genome>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM genomes WHERE description = ?1",
                [description],
                genome_from_row,
            )
            .optional()?)
    }

    pub fn genome_filename_exists(&self, filename: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM genomes WHERE filename = ?1",
                [filename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_genomes(&self) -> Result<Vec<Genome>> {
        let mut stmt = self.conn.prepare("SELECT * FROM genomes ORDER BY id")?;
        let rows = stmt.query_map([], genome_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn delete_genome(&self, id: i64) -> Result<()> {
        let deleted = self.conn.execute("DELETE FROM genomes WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(KmerDbError::GenomeNotFound(id));
        }
        Ok(())
    }

    /// Rewrites a genome's `extra` JSON and refreshes `updated_at`.
    /// Callers mutate a local value and hand it back; there is no
    /// in-place change tracking.
    pub fn touch_genome_extra(&self, id: i64, extra: &Json) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE genomes SET extra = ?1, updated_at = ?2 WHERE id = ?3",
            params![extra.to_string(), now(), id],
        )?;
        if changed == 0 {
            return Err(KmerDbError::GenomeNotFound(id));
        }
        Ok(())
    }

    // Genome sets.

    pub fn insert_genome_set(
        &self,
        name: &str,
        description: Option<&str>,
        extra: Option<&Json>,
    ) -> Result<GenomeSet> {
        if self.genome_set_by_name(name)?.is_some() {
            return Err(KmerDbError::DuplicateGenomeSetName(name.to_string()));
        }
        let ts = now();
        self.conn.execute(
            "INSERT INTO genome_sets (name, description, extra, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![name, description, extra.map(Json::to_string), ts],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row("SELECT * FROM genome_sets WHERE id = ?1", [id], genome_set_from_row)
            .map_err(Into::into)
    }

    pub fn genome_set_by_name(&self, name: &str) -> Result<Option<GenomeSet>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM genome_sets WHERE name = ?1",
                [name],
                genome_set_from_row,
            )
            .optional()?)
    }

    pub fn list_genome_sets(&self) -> Result<Vec<GenomeSet>> {
        let mut stmt = self.conn.prepare("SELECT * FROM genome_sets ORDER BY id")?;
        let rows = stmt.query_map([], genome_set_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn add_genome_to_set(&self, set_id: i64, genome_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO genome_set_assoc (set_id, genome_id) VALUES (?1, ?2)",
            params![set_id, genome_id],
        )?;
        Ok(())
    }

    /// Name of the first genome set a genome belongs to, if any; used
    /// for the `set` column of query output.
    pub fn first_set_name_for_genome(&self, genome_id: i64) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT gs.name FROM genome_sets gs \
                 JOIN genome_set_assoc a ON a.set_id = gs.id \
                 WHERE a.genome_id = ?1 ORDER BY gs.id LIMIT 1",
                [genome_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    // K-mer collections.

    pub fn insert_collection(
        &self,
        title: &str,
        directory: &str,
        prefix: &str,
        k: usize,
        parameters: &Json,
        format: StorageFormatKind,
    ) -> Result<KmerCollection> {
        if self.collection_by_title(title)?.is_some() {
            return Err(KmerDbError::DuplicateCollectionTitle(title.to_string()));
        }
        let ts = now();
        self.conn.execute(
            "INSERT INTO kmer_collections \
             (title, directory, prefix, k, parameters, format, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                title,
                directory,
                prefix,
                k as i64,
                parameters.to_string(),
                format.as_str(),
                ts,
            ],
        )?;
        self.collection(self.conn.last_insert_rowid())
    }

    pub fn collection(&self, id: i64) -> Result<KmerCollection> {
        self.conn
            .query_row(
                "SELECT * FROM kmer_collections WHERE id = ?1",
                [id],
                collection_from_row,
            )
            .optional()?
            .ok_or(KmerDbError::CollectionNotFound(id))
    }

    pub fn collection_by_title(&self, title: &str) -> Result<Option<KmerCollection>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM kmer_collections WHERE title = ?1",
                [title],
                collection_from_row,
            )
            .optional()?)
    }

    pub fn collection_directory_exists(&self, directory: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM kmer_collections WHERE directory = ?1",
                [directory],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_collections(&self) -> Result<Vec<KmerCollection>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM kmer_collections ORDER BY id")?;
        let rows = stmt.query_map([], collection_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Deletes a collection row; its k-mer set rows cascade.
    pub fn delete_collection(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM kmer_collections WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(KmerDbError::CollectionNotFound(id));
        }
        Ok(())
    }

    // K-mer sets.

    pub fn insert_kmer_set(&self, row: &KmerSetRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kmer_sets \
             (collection_id, genome_id, dtype, has_counts, \"count\", filename, extra) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.collection_id,
                row.genome_id,
                row.dtype.as_str(),
                row.has_counts,
                row.count as i64,
                row.filename,
                json_to_sql(&row.extra),
            ],
        )?;
        Ok(())
    }

    pub fn kmer_set_exists(&self, collection_id: i64, genome_id: i64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT genome_id FROM kmer_sets WHERE collection_id = ?1 AND genome_id = ?2",
                params![collection_id, genome_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Reference rows of a collection in deterministic (genome id) order.
    pub fn kmer_sets_for_collection(&self, collection_id: i64) -> Result<Vec<KmerSetRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM kmer_sets WHERE collection_id = ?1 ORDER BY genome_id")?;
        let rows = stmt.query_map([collection_id], kmer_set_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn kmer_set_count(&self, collection_id: i64) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM kmer_sets WHERE collection_id = ?1",
            [collection_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Genomes with no computed set under a collection, in id order;
    /// the builder's work list.
    pub fn genomes_without_set(&self, collection_id: i64) -> Result<Vec<Genome>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM genomes WHERE id NOT IN \
             (SELECT genome_id FROM kmer_sets WHERE collection_id = ?1) ORDER BY id",
        )?;
        let rows = stmt.query_map([collection_id], genome_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn table_counts(&self) -> Result<TableCounts> {
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(TableCounts {
            genomes: count("SELECT COUNT(*) FROM genomes")?,
            genome_sets: count("SELECT COUNT(*) FROM genome_sets")?,
            collections: count("SELECT COUNT(*) FROM kmer_collections")?,
            kmer_sets: count("SELECT COUNT(*) FROM kmer_sets")?,
        })
    }
}

/// Row counts for `db info`.
#[derive(Debug, Clone, Copy)]
pub struct TableCounts {
    pub genomes: u64,
    pub genome_sets: u64,
    pub collections: u64,
    pub kmer_sets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_catalog() -> Catalog {
        let catalog = Catalog {
            conn: Connection::open_in_memory().unwrap(),
        };
        catalog.conn.pragma_update(None, "foreign_keys", true).unwrap();
        catalog.conn.execute_batch(SCHEMA).unwrap();
        catalog
            .conn
            .execute(
                "INSERT INTO schema_revisions (revision, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_REVISION, now()],
            )
            .unwrap();
        catalog
    }

    fn sample_genome(description: &str) -> NewGenome {
        NewGenome {
            description: description.to_string(),
            file_format: "fasta".to_string(),
            is_assembled: true,
            ..NewGenome::default()
        }
    }

    #[test]
    fn test_genome_round_trip() {
        let catalog = memory_catalog();
        let mut new = sample_genome("E. coli K-12");
        new.organism = Some("Escherichia coli".to_string());
        new.gb_acc = Some("NC_000913.3".to_string());
        new.extra = Some(json!({"source": "test"}));
        let genome = catalog.insert_genome(&new, "NC_000913_3.fasta").unwrap();
        assert!(genome.id > 0);
        assert_eq!(genome.created_at, genome.updated_at);

        let fetched = catalog.genome(genome.id).unwrap();
        assert_eq!(fetched.description, "E. coli K-12");
        assert_eq!(fetched.gb_acc.as_deref(), Some("NC_000913.3"));
        assert_eq!(fetched.extra, Some(json!({"source": "test"})));
        assert_eq!(fetched.compression, Compression::None);
    }

    #[test]
    fn test_duplicate_description_rejected_by_unique_index() {
        let catalog = memory_catalog();
        catalog
            .insert_genome(&sample_genome("dup"), "dup_1.fasta")
            .unwrap();
        assert!(catalog
            .insert_genome(&sample_genome("dup"), "dup_2.fasta")
            .is_err());
    }

    #[test]
    fn test_touch_updates_timestamp() {
        let catalog = memory_catalog();
        let genome = catalog
            .insert_genome(&sample_genome("touched"), "touched.fasta")
            .unwrap();
        catalog
            .touch_genome_extra(genome.id, &json!({"seen": 1}))
            .unwrap();
        let fetched = catalog.genome(genome.id).unwrap();
        assert_eq!(fetched.extra, Some(json!({"seen": 1})));
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[test]
    fn test_genome_not_found() {
        let catalog = memory_catalog();
        assert!(matches!(
            catalog.genome(42),
            Err(KmerDbError::GenomeNotFound(42))
        ));
        assert!(matches!(
            catalog.delete_genome(42),
            Err(KmerDbError::GenomeNotFound(42))
        ));
    }

    #[test]
    fn test_genome_sets_membership() {
        let catalog = memory_catalog();
        let genome = catalog
            .insert_genome(&sample_genome("member"), "member.fasta")
            .unwrap();
        let set = catalog
            .insert_genome_set("enterics", Some("test set"), None)
            .unwrap();
        catalog.add_genome_to_set(set.id, genome.id).unwrap();
        assert_eq!(
            catalog.first_set_name_for_genome(genome.id).unwrap(),
            Some("enterics".to_string())
        );
        assert!(matches!(
            catalog.insert_genome_set("enterics", None, None),
            Err(KmerDbError::DuplicateGenomeSetName(_))
        ));
    }

    #[test]
    fn test_collection_and_kmer_sets() {
        let catalog = memory_catalog();
        let genome = catalog
            .insert_genome(&sample_genome("g1"), "g1.fasta")
            .unwrap();
        let collection = catalog
            .insert_collection(
                "Default 16-mers",
                "default_16_mers",
                "ATGAC",
                16,
                &json!({}),
                StorageFormatKind::Coords,
            )
            .unwrap();
        assert_eq!(collection.k, 16);
        assert_eq!(collection.format, StorageFormatKind::Coords);
        assert!(matches!(
            catalog.insert_collection(
                "Default 16-mers",
                "other_dir",
                "A",
                8,
                &json!({}),
                StorageFormatKind::Raw,
            ),
            Err(KmerDbError::DuplicateCollectionTitle(_))
        ));

        assert_eq!(
            catalog.genomes_without_set(collection.id).unwrap().len(),
            1
        );

        catalog
            .insert_kmer_set(&KmerSetRow {
                collection_id: collection.id,
                genome_id: genome.id,
                dtype: ElementType::Bool,
                has_counts: false,
                count: 7,
                filename: format!("gen-{}.npy", genome.id),
                extra: None,
            })
            .unwrap();
        assert!(catalog.kmer_set_exists(collection.id, genome.id).unwrap());
        assert!(catalog.genomes_without_set(collection.id).unwrap().is_empty());

        let sets = catalog.kmer_sets_for_collection(collection.id).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].count, 7);
        assert_eq!(sets[0].dtype, ElementType::Bool);

        // Cascade: dropping the collection drops its set rows.
        catalog.delete_collection(collection.id).unwrap();
        assert_eq!(catalog.kmer_set_count(collection.id).unwrap(), 0);
    }

    #[test]
    fn test_schema_revision_recorded() {
        let catalog = memory_catalog();
        assert_eq!(
            catalog.schema_revision().unwrap().as_deref(),
            Some(SCHEMA_REVISION)
        );
    }
}
