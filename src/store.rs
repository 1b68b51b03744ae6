//! On-disk storage formats for k-mer sets.
//!
//! Both formats write a single self-describing `.npy` array per set.
//! `raw` serializes the dense vector directly; `coords` serializes the
//! sorted coordinate array (with a parallel counts row when the set
//! carries counts) and rebuilds the dense vector on load. Either way
//! the element type and counts flag travel in the catalog row, not the
//! file, so loaders restore the exact dtype that was stored.

use std::io::{Read, Write};

use anyhow::{anyhow, Context, Result};
use ndarray::{Array1, Array2};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};

use crate::errors::KmerDbError;
use crate::kmer::KmerSpec;
use crate::vector::{coords_to_vec, vec_to_coords, DenseVector, ElementType, KmerCoords};

/// Storage-format choice of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFormatKind {
    Raw,
    Coords,
}

impl StorageFormatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageFormatKind::Raw => "raw",
            StorageFormatKind::Coords => "coords",
        }
    }

    pub fn parse(s: &str) -> Result<Self, KmerDbError> {
        match s {
            "raw" => Ok(StorageFormatKind::Raw),
            "coords" => Ok(StorageFormatKind::Coords),
            other => Err(KmerDbError::UnknownStorageFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for StorageFormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-set facts a format needs to restore what it stored.
#[derive(Debug, Clone, Copy)]
pub struct SetFileMeta {
    pub element_type: ElementType,
    pub has_counts: bool,
}

/// Store/load contract shared by the formats. One instance is built per
/// collection; query workers each own a private one.
pub trait KmerStorageFormat: Send + Sync {
    fn store(&self, writer: &mut dyn Write, vec: &DenseVector, meta: &SetFileMeta) -> Result<()>;
    fn load(&self, reader: &mut dyn Read, meta: &SetFileMeta) -> Result<DenseVector>;
    fn store_coords(
        &self,
        writer: &mut dyn Write,
        coords: &KmerCoords,
        meta: &SetFileMeta,
    ) -> Result<()>;
    fn load_coords(&self, reader: &mut dyn Read, meta: &SetFileMeta) -> Result<KmerCoords>;
}

/// Builds the storage format for a collection's spec.
pub fn storage_format(kind: StorageFormatKind, spec: &KmerSpec) -> Box<dyn KmerStorageFormat> {
    let idx_len = spec.idx_len();
    match kind {
        StorageFormatKind::Raw => Box::new(RawFormat { idx_len }),
        StorageFormatKind::Coords => Box::new(CoordsFormat { idx_len }),
    }
}

/// Whether an index array for this space fits 32-bit elements.
fn narrow_indices(idx_len: u64) -> bool {
    idx_len < (1u64 << 32)
}

/// Dense vector serialized as one npy array.
struct RawFormat {
    idx_len: u64,
}

impl RawFormat {
    fn check_len(&self, len: usize) -> Result<(), KmerDbError> {
        if len as u64 != self.idx_len {
            return Err(KmerDbError::VectorLengthMismatch {
                found: len,
                expected: self.idx_len as usize,
            });
        }
        Ok(())
    }
}

impl KmerStorageFormat for RawFormat {
    fn store(&self, writer: &mut dyn Write, vec: &DenseVector, _meta: &SetFileMeta) -> Result<()> {
        self.check_len(vec.len())?;
        match vec {
            DenseVector::Bool(v) => v.write_npy(writer),
            DenseVector::U8(v) => v.write_npy(writer),
            DenseVector::U16(v) => v.write_npy(writer),
            DenseVector::U32(v) => v.write_npy(writer),
        }
        .context("Failed to write dense k-mer vector")?;
        Ok(())
    }

    fn load(&self, reader: &mut dyn Read, meta: &SetFileMeta) -> Result<DenseVector> {
        let vec = match meta.element_type {
            ElementType::Bool => DenseVector::Bool(Array1::<bool>::read_npy(reader)?),
            ElementType::U8 => DenseVector::U8(Array1::<u8>::read_npy(reader)?),
            ElementType::U16 => DenseVector::U16(Array1::<u16>::read_npy(reader)?),
            ElementType::U32 => DenseVector::U32(Array1::<u32>::read_npy(reader)?),
        };
        self.check_len(vec.len())?;
        Ok(vec)
    }

    fn store_coords(
        &self,
        writer: &mut dyn Write,
        coords: &KmerCoords,
        meta: &SetFileMeta,
    ) -> Result<()> {
        let vec = coords_to_vec(coords, self.idx_len, meta.element_type)?;
        self.store(writer, &vec, meta)
    }

    fn load_coords(&self, reader: &mut dyn Read, meta: &SetFileMeta) -> Result<KmerCoords> {
        let vec = self.load(reader, meta)?;
        Ok(vec_to_coords(&vec, meta.has_counts))
    }
}

/// Coordinate array serialized as one npy array: 1-D indices, or a
/// `(2, n)` matrix with a counts row. Indices are `u32` when the index
/// space fits, `u64` otherwise.
struct CoordsFormat {
    idx_len: u64,
}

impl KmerStorageFormat for CoordsFormat {
    fn store(&self, writer: &mut dyn Write, vec: &DenseVector, meta: &SetFileMeta) -> Result<()> {
        if vec.len() as u64 != self.idx_len {
            return Err(KmerDbError::VectorLengthMismatch {
                found: vec.len(),
                expected: self.idx_len as usize,
            }
            .into());
        }
        let coords = vec_to_coords(vec, meta.has_counts);
        self.store_coords(writer, &coords, meta)
    }

    fn load(&self, reader: &mut dyn Read, meta: &SetFileMeta) -> Result<DenseVector> {
        let coords = self.load_coords(reader, meta)?;
        Ok(coords_to_vec(&coords, self.idx_len, meta.element_type)?)
    }

    fn store_coords(
        &self,
        writer: &mut dyn Write,
        coords: &KmerCoords,
        meta: &SetFileMeta,
    ) -> Result<()> {
        let n = coords.len();
        if meta.has_counts {
            let counts = coords
                .counts()
                .ok_or_else(|| anyhow!("Coordinate array is missing its counts row"))?;
            if narrow_indices(self.idx_len) {
                let mut array = Array2::<u32>::zeros((2, n));
                for (i, (&index, &count)) in coords.indices().iter().zip(counts).enumerate() {
                    array[(0, i)] = u32::try_from(index)
                        .context("Coordinate index does not fit the 32-bit index type")?;
                    array[(1, i)] = count;
                }
                array.write_npy(writer)
            } else {
                let mut array = Array2::<u64>::zeros((2, n));
                for (i, (&index, &count)) in coords.indices().iter().zip(counts).enumerate() {
                    array[(0, i)] = index;
                    array[(1, i)] = u64::from(count);
                }
                array.write_npy(writer)
            }
        } else if narrow_indices(self.idx_len) {
            let indices = coords
                .indices()
                .iter()
                .map(|&i| {
                    u32::try_from(i).context("Coordinate index does not fit the 32-bit index type")
                })
                .collect::<Result<Vec<u32>>>()?;
            Array1::from_vec(indices).write_npy(writer)
        } else {
            Array1::from_vec(coords.indices().to_vec()).write_npy(writer)
        }
        .context("Failed to write coordinate array")?;
        Ok(())
    }

    fn load_coords(&self, reader: &mut dyn Read, meta: &SetFileMeta) -> Result<KmerCoords> {
        let coords = if meta.has_counts {
            let (indices, counts) = if narrow_indices(self.idx_len) {
                let array = Array2::<u32>::read_npy(reader)?;
                split_counts_matrix(&array.mapv(u64::from))?
            } else {
                let array = Array2::<u64>::read_npy(reader)?;
                split_counts_matrix(&array)?
            };
            KmerCoords::new(indices, Some(counts))
        } else {
            let indices = if narrow_indices(self.idx_len) {
                Array1::<u32>::read_npy(reader)?.iter().map(|&i| u64::from(i)).collect()
            } else {
                Array1::<u64>::read_npy(reader)?.to_vec()
            };
            KmerCoords::new(indices, None)
        };
        coords
            .validate(self.idx_len)
            .map_err(|detail| anyhow!("Invalid coordinate array: {detail}"))?;
        Ok(coords)
    }
}

fn split_counts_matrix(array: &Array2<u64>) -> Result<(Vec<u64>, Vec<u32>)> {
    if array.nrows() != 2 {
        return Err(anyhow!(
            "Counts matrix has {} rows, expected 2",
            array.nrows()
        ));
    }
    let indices = array.row(0).to_vec();
    let counts = array
        .row(1)
        .iter()
        .map(|&c| u32::try_from(c).context("Stored count does not fit u32"))
        .collect::<Result<Vec<u32>>>()?;
    Ok((indices, counts))
}
