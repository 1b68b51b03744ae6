//! GenBank accession helpers and record URL building.
//!
//! Accession shapes follow the NCBI conventions: an alphabetic prefix
//! (with an optional underscore for RefSeq), 5-10 digits, and an
//! optional version suffix. Remote lookups are out of scope; these
//! helpers only recognize identifiers and build record links.

use std::sync::OnceLock;

use regex::Regex;

pub const NCBI_URL: &str = "https://www.ncbi.nlm.nih.gov";

fn acc_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]+_?\d{5,10}(?:\.\d+)?$").expect("static regex"))
}

fn refseq_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{2}_\d{5,10}(?:\.\d+)?$").expect("static regex"))
}

// For searching inside larger strings (file names and the like); the
// boundary assertions keep digits of longer tokens from matching.
fn acc_search_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^|[^A-Za-z0-9])([A-Z]+_?\d{5,10}(?:\.\d+)?)($|[^A-Za-z0-9])")
            .expect("static regex")
    })
}

/// Checks whether a string is shaped like an accession number.
pub fn is_accession(value: &str) -> bool {
    acc_re().is_match(value)
}

/// Checks whether an accession is a RefSeq accession.
pub fn is_refseq(accession: &str) -> bool {
    refseq_re().is_match(accession)
}

/// Extracts an accession number embedded in a larger string (a file
/// name, a FASTA header). With `one_only`, more than one candidate
/// yields `None`.
pub fn extract_accession(value: &str, one_only: bool) -> Option<String> {
    let mut found = None;
    let mut start = 0;
    while let Some(captures) = acc_search_re().captures(&value[start..]) {
        let m = captures.get(2).expect("group 2 always captures");
        if found.is_some() {
            return if one_only { None } else { found };
        }
        found = Some(m.as_str().to_string());
        start += m.end();
        if start >= value.len() {
            break;
        }
    }
    found
}

/// URL of a record in an external sequence archive, from the database
/// name and the accession (or numeric id).
pub fn record_url(db: &str, acc_or_id: &str) -> String {
    format!("{NCBI_URL}/{db}/{acc_or_id}")
}
