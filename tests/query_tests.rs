use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn kmerdb() -> Command {
    Command::cargo_bin("kmerdb").expect("binary builds")
}

const G1: &str = ">g1\nACGTACGTAA\n";
const G2: &str = ">g2\nATTTGGGCCC\n";
const G3: &str = ">g3\nAACCGGTTAC\n";

/// Initializes a database with three genomes and a computed collection
/// (k=4, prefix A), returning the database directory.
fn reference_db(tmp: &TempDir) -> PathBuf {
    let db_dir = tmp.path().join("db");
    kmerdb().args(["db", "init"]).arg(&db_dir).assert().success();

    for (name, contents, description) in [
        ("g1.fasta", G1, "genome one"),
        ("g2.fasta", G2, "genome two"),
        ("g3.fasta", G3, "genome three"),
    ] {
        let src = tmp.path().join(name);
        fs::write(&src, contents).unwrap();
        kmerdb()
            .arg("--db")
            .arg(&db_dir)
            .args(["genome", "add"])
            .arg(&src)
            .args(["--description", description, "--assembled", "true"])
            .args(["--organism", "Test organism"])
            .assert()
            .success();
    }

    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["collection", "create", "4", "A", "Query fixture"])
        .assert()
        .success();
    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["calc", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Calculated 3 sets, 0 errors"));
    db_dir
}

fn query_file(tmp: &TempDir) -> PathBuf {
    // The query is exactly G2's sequence, so its k-mer set equals
    // G2's reference set.
    let path = tmp.path().join("query.fasta");
    fs::write(&path, G2).unwrap();
    path
}

#[test]
fn query_ranks_identical_genome_first() {
    let tmp = TempDir::new().unwrap();
    let db_dir = reference_db(&tmp);
    let query = query_file(&tmp);

    let assert = kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["query", "1"])
        .arg(&query)
        .args(["-m", "jaccard", "-n", "3"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let rank_lines: Vec<&str> = stdout
        .lines()
        .filter(|l| l.contains("genome "))
        .collect();
    // Jaccard 1 for the identical genome, strictly less for the rest.
    assert!(rank_lines[0].starts_with("1 genome two"), "got: {rank_lines:?}");
    for line in &rank_lines[1..] {
        let score: f32 = line.split(' ').next().unwrap().parse().unwrap();
        assert!(score < 1.0);
    }
}

#[test]
fn query_writes_ranked_csv() {
    let tmp = TempDir::new().unwrap();
    let db_dir = reference_db(&tmp);
    let query = query_file(&tmp);
    let csv_path = tmp.path().join("matches.csv");

    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["query", "1"])
        .arg(&query)
        .args(["-n", "3", "--no-print", "--csv"])
        .arg(&csv_path)
        .assert()
        .success();

    let contents = fs::read_to_string(&csv_path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(
        lines.next().unwrap(),
        "query_file,metric,rank,score,description,organism,genus,species,strain,set,accession,database,link"
    );

    // Metrics appear in registry order; Hamming rank 1 is the identical
    // genome at distance 0.
    let first = lines.next().unwrap();
    assert!(first.contains("Hamming distance,1,0,genome two"), "got: {first}");

    // The Jaccard block ranks the identical genome first with score 1.
    let jaccard_top = contents
        .lines()
        .find(|l| l.contains("Jaccard index,1,"))
        .unwrap();
    assert!(jaccard_top.contains("genome two"), "got: {jaccard_top}");
    assert!(jaccard_top.contains(",1,1,"), "got: {jaccard_top}");

    // Three metrics x three references, plus the header.
    assert_eq!(contents.lines().count(), 1 + 3 * 3);
}

#[test]
fn query_directory_batches_all_files() {
    let tmp = TempDir::new().unwrap();
    let db_dir = reference_db(&tmp);
    let query_dir = tmp.path().join("queries");
    fs::create_dir(&query_dir).unwrap();
    fs::write(query_dir.join("a.fasta"), G1).unwrap();
    fs::write(query_dir.join("b.fasta"), G2).unwrap();

    let assert = kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["query", "1"])
        .arg(&query_dir)
        .args(["-m", "jaccard", "-n", "1"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    // One header per query file, in sorted file order.
    assert!(stdout.contains("a.fasta"));
    assert!(stdout.contains("b.fasta"));
}

#[test]
fn query_unknown_metric_fails() {
    let tmp = TempDir::new().unwrap();
    let db_dir = reference_db(&tmp);
    let query = query_file(&tmp);

    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["query", "1"])
        .arg(&query)
        .args(["-m", "cosine"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown query metric"));
}

#[test]
fn query_missing_collection_fails() {
    let tmp = TempDir::new().unwrap();
    let db_dir = reference_db(&tmp);
    let query = query_file(&tmp);

    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["query", "99"])
        .arg(&query)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No k-mer collection with id 99"));
}

#[test]
fn query_empty_collection_fails() {
    let tmp = TempDir::new().unwrap();
    let db_dir = tmp.path().join("db");
    kmerdb().args(["db", "init"]).arg(&db_dir).assert().success();
    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["collection", "create", "4", "A", "Empty"])
        .assert()
        .success();
    let query = query_file(&tmp);

    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["query", "1"])
        .arg(&query)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no computed k-mer sets"));
}

#[test]
fn removed_collection_leaves_no_files() {
    let tmp = TempDir::new().unwrap();
    let db_dir = reference_db(&tmp);
    let coll_dir: PathBuf = db_dir.join("kmer_collections").join("query_fixture");
    assert!(coll_dir.join("gen-1.npy").is_file());

    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["collection", "rm", "1"])
        .assert()
        .success();
    assert!(!coll_dir.exists());

    kmerdb()
        .arg("--db")
        .arg(&db_dir)
        .args(["collection", "list"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
