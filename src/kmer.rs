//! K-mer enumeration and index arithmetic.
//!
//! K-mers are indexed by their lexicographic order over the alphabet
//! `A < C < G < T`. Only k-mers beginning with a fixed prefix are
//! enumerated, and the emitted index covers the suffix alone (the prefix
//! is constant and therefore redundant), so the index space has size
//! `4^(k - prefix_len)`.

use crate::errors::{KmerDbError, Result};

const BITS_PER_BASE: u32 = 2;

/// The four nucleotides in index order.
pub const NUCLEOTIDES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Maps an (upper-case) nucleotide to its 2-bit value.
/// A -> 0, C -> 1, G -> 2, T -> 3; anything else is invalid.
#[inline]
fn base_to_index(base: u8) -> Option<u64> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

#[inline]
fn index_to_base(val: u64) -> u8 {
    NUCLEOTIDES[(val & 0b11) as usize]
}

/// Watson-Crick complement of a single (upper-case) base.
/// Bases outside `{A,C,G,T}` are passed through unchanged so that
/// ambiguity codes stay invalid after complementing.
#[inline]
fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        other => other,
    }
}

/// Reverse complement of a sequence.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// Computes the index of a k-mer suffix, reading it as a base-4 number
/// (most significant digit first). Returns `None` if the suffix contains
/// a symbol outside `{A,C,G,T}`.
pub fn kmer_index(suffix: &[u8]) -> Option<u64> {
    let mut index: u64 = 0;
    for &base in suffix {
        index = (index << BITS_PER_BASE) | base_to_index(base)?;
    }
    Some(index)
}

/// Recovers the k-mer suffix of length `len` at a given index.
/// Inverse of [`kmer_index`] for all valid suffixes.
pub fn kmer_at_index(index: u64, len: usize) -> Vec<u8> {
    let mut suffix = vec![0u8; len];
    let mut rest = index;
    for slot in suffix.iter_mut().rev() {
        *slot = index_to_base(rest);
        rest >>= BITS_PER_BASE;
    }
    suffix
}

/// Parameters of a k-mer search: the total k-mer length and the constant
/// prefix every enumerated k-mer must start with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmerSpec {
    k: usize,
    prefix: Vec<u8>,
}

impl KmerSpec {
    /// Validates and builds a spec. The prefix is upper-cased; it may be
    /// empty (every position is then a candidate) but must be shorter
    /// than `k`, and the suffix may cover at most 31 positions so that
    /// indices fit in a `u64`.
    pub fn new(k: usize, prefix: &str) -> Result<Self> {
        if k == 0 {
            return Err(KmerDbError::InvalidK(k));
        }
        let prefix = prefix.to_ascii_uppercase().into_bytes();
        if !prefix.iter().all(|b| NUCLEOTIDES.contains(b)) {
            return Err(KmerDbError::InvalidPrefix(
                String::from_utf8_lossy(&prefix).into_owned(),
            ));
        }
        if prefix.len() >= k {
            return Err(KmerDbError::PrefixTooLong {
                prefix: String::from_utf8_lossy(&prefix).into_owned(),
                plen: prefix.len(),
                k,
            });
        }
        if k - prefix.len() > 31 {
            return Err(KmerDbError::InvalidK(k));
        }
        Ok(KmerSpec { k, prefix })
    }

    /// Total k-mer length, prefix included.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The constant prefix as bytes.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn prefix_str(&self) -> &str {
        // Construction guarantees ASCII nucleotides.
        std::str::from_utf8(&self.prefix).unwrap_or_default()
    }

    /// Length of the variable suffix, `k - |prefix|`.
    pub fn suffix_len(&self) -> usize {
        self.k - self.prefix.len()
    }

    /// Cardinality of the index space, `4^suffix_len`.
    pub fn idx_len(&self) -> u64 {
        1u64 << (2 * self.suffix_len() as u32)
    }

    /// Creates a finder enumerating the suffix indices of all matching
    /// k-mers in `seq`.
    pub fn find(&self, seq: &[u8], opts: FindOptions) -> KmerFinder {
        KmerFinder::new(self, seq, None, None, opts)
    }

    /// As [`KmerSpec::find`], but discards any k-mer whose window
    /// contains a PHRED score below `threshold`. `quality` must have the
    /// same length as `seq`.
    pub fn find_quality(
        &self,
        seq: &[u8],
        quality: &[u8],
        threshold: u8,
        opts: FindOptions,
    ) -> Result<KmerFinder> {
        if quality.len() != seq.len() {
            return Err(KmerDbError::QualityLengthMismatch {
                qual: quality.len(),
                seq: seq.len(),
            });
        }
        Ok(KmerFinder::new(self, seq, Some(quality), Some(threshold), opts))
    }
}

/// Flags controlling a k-mer search.
#[derive(Debug, Clone, Copy)]
pub struct FindOptions {
    /// Also search the reverse complement strand.
    pub revcomp: bool,
    /// Treat the sequence as circular and search the wrap-around window.
    pub circular: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        FindOptions {
            revcomp: true,
            circular: false,
        }
    }
}

/// One scan buffer: a linear stretch of (upper-case) sequence with its
/// quality scores kept in lock-step.
struct ScanBuf {
    seq: Vec<u8>,
    qual: Option<Vec<u8>>,
}

impl ScanBuf {
    /// The wrap-around window of a circular sequence: the last `k-1`
    /// symbols followed by the first `k-1`. Any k-long match inside it
    /// necessarily spans the origin, so linear scans cannot have seen it.
    fn wrap_window(&self, k: usize) -> ScanBuf {
        let n = self.seq.len();
        let take = (k - 1).min(n);
        let mut seq = Vec::with_capacity(2 * take);
        seq.extend_from_slice(&self.seq[n - take..]);
        seq.extend_from_slice(&self.seq[..take]);
        let qual = self.qual.as_ref().map(|q| {
            let mut w = Vec::with_capacity(2 * take);
            w.extend_from_slice(&q[n - take..]);
            w.extend_from_slice(&q[..take]);
            w
        });
        ScanBuf { seq, qual }
    }
}

/// Streaming enumerator over one sequence. Yields suffix indices in
/// `[0, 4^suffix_len)`: forward matches first, then reverse-complement
/// matches, then wrap-around matches for circular sequences. Consumers
/// treat the output as a set.
pub struct KmerFinder {
    k: usize,
    plen: usize,
    prefix: Vec<u8>,
    threshold: Option<u8>,
    scans: Vec<ScanBuf>,
    scan: usize,
    cursor: usize,
}

impl KmerFinder {
    fn new(
        spec: &KmerSpec,
        seq: &[u8],
        quality: Option<&[u8]>,
        threshold: Option<u8>,
        opts: FindOptions,
    ) -> Self {
        let upper = seq.to_ascii_uppercase();
        let forward = ScanBuf {
            qual: quality.map(<[u8]>::to_vec),
            seq: upper,
        };
        let revcomp = opts.revcomp.then(|| ScanBuf {
            seq: reverse_complement(&forward.seq),
            qual: forward.qual.as_ref().map(|q| {
                let mut r = q.clone();
                r.reverse();
                r
            }),
        });

        let mut scans = Vec::with_capacity(4);
        if opts.circular && !forward.seq.is_empty() {
            let fwd_wrap = forward.wrap_window(spec.k);
            let rc_wrap = revcomp.as_ref().map(|rc| rc.wrap_window(spec.k));
            scans.push(forward);
            scans.extend(revcomp);
            scans.push(fwd_wrap);
            scans.extend(rc_wrap);
        } else {
            scans.push(forward);
            scans.extend(revcomp);
        }

        KmerFinder {
            k: spec.k,
            plen: spec.prefix.len(),
            prefix: spec.prefix.clone(),
            threshold,
            scans,
            scan: 0,
            cursor: 0,
        }
    }

    /// Locates the next prefix occurrence in the current scan buffer at
    /// or after the cursor, with room for a full k-mer. An empty prefix
    /// matches at every position.
    fn next_match(&mut self) -> Option<usize> {
        let seq = &self.scans[self.scan].seq;
        if seq.len() < self.k {
            return None;
        }
        let last_start = seq.len() - self.k;
        while self.cursor <= last_start {
            let p = self.cursor;
            if seq[p..p + self.plen] == self.prefix[..] {
                // Overlapping matches are expected; advance by one.
                self.cursor = p + 1;
                return Some(p);
            }
            self.cursor += 1;
        }
        None
    }
}

impl Iterator for KmerFinder {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.scan < self.scans.len() {
            while let Some(p) = self.next_match() {
                let buf = &self.scans[self.scan];

                // The whole window must clear the quality threshold.
                if let (Some(qual), Some(threshold)) = (&buf.qual, self.threshold) {
                    if qual[p..p + self.k].iter().any(|&q| q < threshold) {
                        continue;
                    }
                }

                // A suffix overlapping an ambiguous symbol is skipped.
                if let Some(index) = kmer_index(&buf.seq[p + self.plen..p + self.k]) {
                    return Some(index);
                }
            }
            self.scan += 1;
            self.cursor = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn spec(k: usize, prefix: &str) -> KmerSpec {
        KmerSpec::new(k, prefix).unwrap()
    }

    fn index_set(finder: KmerFinder) -> BTreeSet<u64> {
        finder.collect()
    }

    #[test]
    fn test_base_order() {
        assert_eq!(kmer_index(b"A"), Some(0));
        assert_eq!(kmer_index(b"C"), Some(1));
        assert_eq!(kmer_index(b"G"), Some(2));
        assert_eq!(kmer_index(b"T"), Some(3));
        assert_eq!(kmer_index(b"N"), None);
    }

    #[test]
    fn test_kmer_index_msb_first() {
        // ACG = 0*16 + 1*4 + 2
        assert_eq!(kmer_index(b"ACG"), Some(0b000110));
        assert_eq!(kmer_index(b"TTT"), Some(63));
        assert_eq!(kmer_index(b"ACGNT"), None);
    }

    #[test]
    fn test_round_trip_exhaustive() {
        for len in 1..=6usize {
            let n = 1u64 << (2 * len as u32);
            for index in 0..n {
                let suffix = kmer_at_index(index, len);
                assert_eq!(kmer_index(&suffix), Some(index));
            }
        }
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"ACGT"), b"ACGT".to_vec());
        assert_eq!(reverse_complement(b"AAGC"), b"GCTT".to_vec());
        assert_eq!(reverse_complement(b"ATGACATGCATATG"), b"CATATGCATGTCAT".to_vec());
        // Ambiguity codes survive so downstream validity checks still fire.
        assert_eq!(reverse_complement(b"ANT"), b"ANT".to_vec());
    }

    #[test]
    fn test_spec_validation() {
        assert!(KmerSpec::new(0, "A").is_err());
        assert!(KmerSpec::new(5, "ATGAC").is_err()); // |prefix| == k
        assert!(KmerSpec::new(5, "ATX").is_err());
        assert!(KmerSpec::new(40, "A").is_err()); // suffix too long for u64
        let s = spec(5, "at");
        assert_eq!(s.prefix(), b"AT");
        assert_eq!(s.suffix_len(), 3);
        assert_eq!(s.idx_len(), 64);
    }

    #[test]
    fn test_empty_prefix_scans_every_window() {
        let s = spec(2, "");
        let found = index_set(s.find(
            b"ACGT",
            FindOptions {
                revcomp: false,
                circular: false,
            },
        ));
        // AC, CG, GT
        let expected: BTreeSet<u64> = [b"AC", b"CG", b"GT"]
            .iter()
            .map(|w| kmer_index(*w).unwrap())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_forward_scan() {
        // Matches at 0 (ATGAC), 5 (ATGCA) and 9 (ATATG).
        let s = spec(5, "AT");
        let found = index_set(s.find(
            b"ATGACATGCATATG",
            FindOptions {
                revcomp: false,
                circular: false,
            },
        ));
        let expected: BTreeSet<u64> = [b"GAC", b"GCA", b"ATG"]
            .iter()
            .map(|w| kmer_index(*w).unwrap())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_revcomp_scan_adds_reverse_matches() {
        let s = spec(5, "AT");
        let found = index_set(s.find(b"ATGACATGCATATG", FindOptions::default()));
        // Forward: GAC, GCA, ATG. Reverse (CATATGCATGTCAT): ATG, GCA, GTC.
        let expected: BTreeSet<u64> = [&b"GAC"[..], b"GCA", b"ATG", b"GTC"]
            .iter()
            .map(|w| kmer_index(w).unwrap())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_revcomp_symmetry() {
        // find(S, revcomp) == find(S) | find(revcomp(S)) as sets.
        let s = spec(4, "A");
        let seq = b"ATTGACCAGTTAACGGA";
        let no_rc = FindOptions {
            revcomp: false,
            circular: false,
        };
        let both = index_set(s.find(seq, FindOptions::default()));
        let mut union = index_set(s.find(seq, no_rc));
        union.extend(index_set(s.find(&reverse_complement(seq), no_rc)));
        assert_eq!(both, union);
    }

    #[test]
    fn test_ambiguous_symbols_skipped() {
        let s = spec(3, "A");
        let found = index_set(s.find(
            b"ANCGATT",
            FindOptions {
                revcomp: false,
                circular: false,
            },
        ));
        // ANC is invalid; ATT at position 4 is the only valid match.
        let expected: BTreeSet<u64> = [kmer_index(b"TT").unwrap()].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_lowercase_input_uppercased() {
        let s = spec(3, "A");
        let fwd = FindOptions {
            revcomp: false,
            circular: false,
        };
        assert_eq!(
            index_set(s.find(b"acgacg", fwd)),
            index_set(s.find(b"ACGACG", fwd))
        );
    }

    #[test]
    fn test_overlapping_prefix_matches() {
        // Prefix AA in AAAAA: starts 0, 1 and 2 all yield candidates.
        let s = spec(3, "AA");
        let found: Vec<u64> = s
            .find(
                b"AAAAA",
                FindOptions {
                    revcomp: false,
                    circular: false,
                },
            )
            .collect();
        assert_eq!(found, vec![0, 0, 0]);
    }

    #[test]
    fn test_short_and_empty_sequences() {
        let s = spec(5, "AT");
        let opts = FindOptions::default();
        assert_eq!(s.find(b"", opts).count(), 0);
        assert_eq!(s.find(b"ATG", opts).count(), 0); // k > len
        // k == len: at most one match per direction.
        let found: Vec<u64> = s
            .find(
                b"ATGCA",
                FindOptions {
                    revcomp: false,
                    circular: false,
                },
            )
            .collect();
        assert_eq!(found, vec![kmer_index(b"GCA").unwrap()]);
    }

    #[test]
    fn test_circular_wrap() {
        // seq = GACATG, circular: ATG..GAC wraps as ATGGAC at the origin.
        let s = spec(5, "AT");
        let linear = index_set(s.find(
            b"GACATG",
            FindOptions {
                revcomp: false,
                circular: false,
            },
        ));
        assert!(linear.is_empty());
        let circular = index_set(s.find(
            b"GACATG",
            FindOptions {
                revcomp: false,
                circular: true,
            },
        ));
        // Wrap window: CATG + GACA = CATGGACA -> ATGGA at offset 1.
        let expected: BTreeSet<u64> = [kmer_index(b"GGA").unwrap()].into_iter().collect();
        assert_eq!(circular, expected);
    }

    #[test]
    fn test_circular_subset_of_doubled_sequence() {
        // find(S + S[..k-1], linear) must cover find(S, circular).
        let s = spec(4, "A");
        let seq = b"ACGGTTACA";
        let mut doubled = seq.to_vec();
        doubled.extend_from_slice(&seq[..3]);
        let opts = FindOptions {
            revcomp: false,
            circular: false,
        };
        let doubled_set = index_set(s.find(&doubled, opts));
        let circular_set = index_set(s.find(
            seq,
            FindOptions {
                revcomp: false,
                circular: true,
            },
        ));
        assert!(circular_set.is_subset(&doubled_set));
    }

    #[test]
    fn test_quality_threshold_all_pass() {
        let s = spec(5, "AT");
        let seq = b"ATGACATGCATATG";
        let qual = vec![30u8; seq.len()];
        let found = index_set(
            s.find_quality(seq, &qual, 25, FindOptions::default())
                .unwrap(),
        );
        let unfiltered = index_set(s.find(seq, FindOptions::default()));
        assert_eq!(found, unfiltered);
    }

    #[test]
    fn test_quality_threshold_drops_windows() {
        let s = spec(5, "AT");
        let seq = b"ATGACATGCATATG";
        let mut qual = vec![30u8; seq.len()];
        qual[6] = 10; // inside ATGCA at 5 and at the edge of GAC's window
        let found = index_set(
            s.find_quality(
                seq,
                &qual,
                20,
                FindOptions {
                    revcomp: false,
                    circular: false,
                },
            )
            .unwrap(),
        );
        // ATGCA (positions 5..10) contains position 6 and is dropped;
        // ATGAC (0..5) and ATATG (9..14) survive.
        let expected: BTreeSet<u64> = [b"GAC", b"ATG"]
            .iter()
            .map(|w| kmer_index(*w).unwrap())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_quality_reversed_for_revcomp_scan() {
        let s = spec(3, "");
        let seq = b"ACGTT";
        let mut qual = vec![40u8; 5];
        qual[0] = 5; // kills windows touching position 0 on both strands
        let found = index_set(
            s.find_quality(seq, &qual, 10, FindOptions::default())
                .unwrap(),
        );
        // Forward survivors: CGT, GTT. Reverse complement AACGT with
        // reversed quality kills the trailing window CGT; survivors AAC, ACG.
        let expected: BTreeSet<u64> = [&b"CGT"[..], b"GTT", b"AAC", b"ACG"]
            .iter()
            .map(|w| kmer_index(w).unwrap())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_quality_length_mismatch() {
        let s = spec(3, "A");
        assert!(s
            .find_quality(b"ACGT", &[30, 30], 10, FindOptions::default())
            .is_err());
    }
}
