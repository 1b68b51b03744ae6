//! Dense and sparse representations of a k-mer set.
//!
//! A dense vector has one slot per possible suffix index (`idx_len` of
//! the owning [`KmerSpec`](crate::kmer::KmerSpec)) and is either a
//! presence vector or a small-count vector; the sparse form is the
//! sorted array of occupied indices, optionally paired with counts.
//! Conversions between the two are lossless.

use ndarray::Array1;

use crate::errors::{KmerDbError, Result};

/// Closed set of dense-vector element types. The tag is stored with
/// every k-mer set row so loaders can restore the exact dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Bool,
    U8,
    U16,
    U32,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::U8 => "u8",
            ElementType::U16 => "u16",
            ElementType::U32 => "u32",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "bool" => Ok(ElementType::Bool),
            "u8" => Ok(ElementType::U8),
            "u16" => Ok(ElementType::U16),
            "u32" => Ok(ElementType::U32),
            other => Err(KmerDbError::UnknownElementType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dense k-mer vector of one of the closed element types.
#[derive(Debug, Clone, PartialEq)]
pub enum DenseVector {
    Bool(Array1<bool>),
    U8(Array1<u8>),
    U16(Array1<u16>),
    U32(Array1<u32>),
}

impl DenseVector {
    pub fn zeros(dtype: ElementType, len: usize) -> Self {
        match dtype {
            ElementType::Bool => DenseVector::Bool(Array1::from_elem(len, false)),
            ElementType::U8 => DenseVector::U8(Array1::zeros(len)),
            ElementType::U16 => DenseVector::U16(Array1::zeros(len)),
            ElementType::U32 => DenseVector::U32(Array1::zeros(len)),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            DenseVector::Bool(_) => ElementType::Bool,
            DenseVector::U8(_) => ElementType::U8,
            DenseVector::U16(_) => ElementType::U16,
            DenseVector::U32(_) => ElementType::U32,
        }
    }

    /// Whether this vector carries counts rather than bare presence.
    pub fn has_counts(&self) -> bool {
        !matches!(self, DenseVector::Bool(_))
    }

    pub fn len(&self) -> usize {
        match self {
            DenseVector::Bool(v) => v.len(),
            DenseVector::U8(v) => v.len(),
            DenseVector::U16(v) => v.len(),
            DenseVector::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count at one slot, presence reported as 1.
    pub fn count_at(&self, index: usize) -> u32 {
        match self {
            DenseVector::Bool(v) => u32::from(v[index]),
            DenseVector::U8(v) => u32::from(v[index]),
            DenseVector::U16(v) => u32::from(v[index]),
            DenseVector::U32(v) => v[index],
        }
    }

    /// Number of occupied slots.
    pub fn nonzero_count(&self) -> u64 {
        match self {
            DenseVector::Bool(v) => v.iter().filter(|&&b| b).count() as u64,
            DenseVector::U8(v) => v.iter().filter(|&&c| c > 0).count() as u64,
            DenseVector::U16(v) => v.iter().filter(|&&c| c > 0).count() as u64,
            DenseVector::U32(v) => v.iter().filter(|&&c| c > 0).count() as u64,
        }
    }

    /// Collapses counts to a presence vector. Metrics operate on this.
    pub fn to_bool(&self) -> Array1<bool> {
        match self {
            DenseVector::Bool(v) => v.clone(),
            DenseVector::U8(v) => v.mapv(|c| c > 0),
            DenseVector::U16(v) => v.mapv(|c| c > 0),
            DenseVector::U32(v) => v.mapv(|c| c > 0),
        }
    }

    /// Presence vector of slots whose count is at least `threshold`.
    pub fn threshold(&self, threshold: u32) -> DenseVector {
        let out = match self {
            DenseVector::Bool(v) => v.mapv(|b| u32::from(b) >= threshold),
            DenseVector::U8(v) => v.mapv(|c| u32::from(c) >= threshold),
            DenseVector::U16(v) => v.mapv(|c| u32::from(c) >= threshold),
            DenseVector::U32(v) => v.mapv(|c| c >= threshold),
        };
        DenseVector::Bool(out)
    }
}

/// Sparse coordinate form: the strictly increasing indices of the
/// occupied slots, optionally paired with their counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmerCoords {
    indices: Vec<u64>,
    counts: Option<Vec<u32>>,
}

impl KmerCoords {
    pub fn new(indices: Vec<u64>, counts: Option<Vec<u32>>) -> Self {
        KmerCoords { indices, counts }
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn counts(&self) -> Option<&[u32]> {
        self.counts.as_deref()
    }

    pub fn has_counts(&self) -> bool {
        self.counts.is_some()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Checks the representation invariants: indices strictly
    /// increasing and below `idx_len`, counts parallel and positive.
    pub fn validate(&self, idx_len: u64) -> std::result::Result<(), String> {
        for pair in self.indices.windows(2) {
            if pair[0] >= pair[1] {
                return Err(format!(
                    "indices not strictly increasing at {} >= {}",
                    pair[0], pair[1]
                ));
            }
        }
        if let Some(&last) = self.indices.last() {
            if last >= idx_len {
                return Err(format!("index {last} out of range (idx_len {idx_len})"));
            }
        }
        if let Some(counts) = &self.counts {
            if counts.len() != self.indices.len() {
                return Err(format!(
                    "counts row has length {} but {} indices are listed",
                    counts.len(),
                    self.indices.len()
                ));
            }
            if counts.iter().any(|&c| c == 0) {
                return Err("counts row contains a zero".to_string());
            }
        }
        Ok(())
    }
}

/// Sets the listed indices in a presence vector, creating one of length
/// `idx_len` unless an accumulator is passed in. Passing the previous
/// output back in ORs across records.
pub fn bool_vec(
    indices: impl IntoIterator<Item = u64>,
    idx_len: u64,
    out: Option<DenseVector>,
) -> Result<DenseVector> {
    let mut vec = match out {
        Some(v) => {
            check_len(&v, idx_len)?;
            v
        }
        None => DenseVector::zeros(ElementType::Bool, idx_len as usize),
    };
    // A count accumulator also absorbs presence updates.
    if !matches!(vec, DenseVector::Bool(_)) {
        return counts_vec_into(indices, vec);
    }
    if let DenseVector::Bool(v) = &mut vec {
        for index in indices {
            v[index as usize] = true;
        }
    }
    Ok(vec)
}

/// Increments the listed indices in a count vector, creating one of the
/// given dtype unless an accumulator is passed in. Overflow of the
/// element type is an error, not saturation.
pub fn counts_vec(
    indices: impl IntoIterator<Item = u64>,
    idx_len: u64,
    dtype: ElementType,
    out: Option<DenseVector>,
) -> Result<DenseVector> {
    let vec = match out {
        Some(v) => {
            check_len(&v, idx_len)?;
            v
        }
        None => DenseVector::zeros(dtype, idx_len as usize),
    };
    counts_vec_into(indices, vec)
}

fn counts_vec_into(
    indices: impl IntoIterator<Item = u64>,
    mut vec: DenseVector,
) -> Result<DenseVector> {
    fn bump<T: Copy + num_add::CheckedIncrement>(
        v: &mut Array1<T>,
        index: u64,
        dtype: &'static str,
    ) -> Result<()> {
        let slot = &mut v[index as usize];
        *slot = slot
            .checked_increment()
            .ok_or(KmerDbError::CountOverflow { index, dtype })?;
        Ok(())
    }

    match &mut vec {
        DenseVector::Bool(v) => {
            for index in indices {
                v[index as usize] = true;
            }
        }
        DenseVector::U8(v) => {
            for index in indices {
                bump(v, index, "u8")?;
            }
        }
        DenseVector::U16(v) => {
            for index in indices {
                bump(v, index, "u16")?;
            }
        }
        DenseVector::U32(v) => {
            for index in indices {
                bump(v, index, "u32")?;
            }
        }
    }
    Ok(vec)
}

mod num_add {
    pub trait CheckedIncrement: Sized {
        fn checked_increment(self) -> Option<Self>;
    }
    impl CheckedIncrement for u8 {
        fn checked_increment(self) -> Option<Self> {
            self.checked_add(1)
        }
    }
    impl CheckedIncrement for u16 {
        fn checked_increment(self) -> Option<Self> {
            self.checked_add(1)
        }
    }
    impl CheckedIncrement for u32 {
        fn checked_increment(self) -> Option<Self> {
            self.checked_add(1)
        }
    }
}

fn check_len(vec: &DenseVector, idx_len: u64) -> Result<()> {
    if vec.len() as u64 != idx_len {
        return Err(KmerDbError::VectorLengthMismatch {
            found: vec.len(),
            expected: idx_len as usize,
        });
    }
    Ok(())
}

/// Converts a dense vector to coordinate form. The result is canonical:
/// equal sets always produce identical coordinate arrays.
pub fn vec_to_coords(vec: &DenseVector, counts: bool) -> KmerCoords {
    let mut indices = Vec::new();
    let mut count_row = counts.then(Vec::new);
    for i in 0..vec.len() {
        let c = vec.count_at(i);
        if c > 0 {
            indices.push(i as u64);
            if let Some(row) = &mut count_row {
                row.push(c);
            }
        }
    }
    KmerCoords::new(indices, count_row)
}

/// Reconstructs the dense vector a coordinate array was produced from.
/// Writes 1 (or `true`) at each listed index, or the paired count when
/// the coordinates carry one.
pub fn coords_to_vec(coords: &KmerCoords, idx_len: u64, dtype: ElementType) -> Result<DenseVector> {
    let mut vec = DenseVector::zeros(dtype, idx_len as usize);
    let set = |vec: &mut DenseVector, index: u64, count: u32| -> Result<()> {
        let i = index as usize;
        match vec {
            DenseVector::Bool(v) => v[i] = count > 0,
            DenseVector::U8(v) => {
                v[i] = u8::try_from(count).map_err(|_| KmerDbError::CountOverflow {
                    index,
                    dtype: "u8",
                })?
            }
            DenseVector::U16(v) => {
                v[i] = u16::try_from(count).map_err(|_| KmerDbError::CountOverflow {
                    index,
                    dtype: "u16",
                })?
            }
            DenseVector::U32(v) => v[i] = count,
        }
        Ok(())
    };

    match coords.counts() {
        Some(counts) => {
            for (&index, &count) in coords.indices().iter().zip(counts) {
                set(&mut vec, index, count)?;
            }
        }
        None => {
            for &index in coords.indices() {
                set(&mut vec, index, 1)?;
            }
        }
    }
    Ok(vec)
}
