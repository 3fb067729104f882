//! Exact nearest-neighbor vector index.
//!
//! Brute-force linear scan over fixed-dimension `f32` vectors using squared
//! Euclidean (L2) distance. Exact by design: at the target corpus scale
//! (~10^4 records) an O(n*d) scan per query is fine. Beyond ~10^5-10^6
//! records an approximate structure would be needed; that is a scalability
//! ceiling of this module, not a defect.

use crate::error::{ChronicleError, IndexError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes identifying a persisted index snapshot.
const INDEX_MAGIC: [u8; 4] = *b"CHIX";

/// In-memory exact nearest-neighbor index. Vector at slot `i` corresponds to
/// corpus record `i`; the index never owns or reorders the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimensions: usize,
    count: usize,
    /// Flat row-major storage: `count * dimensions` floats.
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from a sequence of vectors. All vectors must share the
    /// same dimension; the input must be non-empty.
    pub fn build(vectors: Vec<Vec<f32>>) -> std::result::Result<Self, IndexError> {
        let Some(first) = vectors.first() else {
            return Err(IndexError::EmptyCorpus);
        };
        let dimensions = first.len();
        if dimensions == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let mut data = Vec::with_capacity(vectors.len() * dimensions);
        for vector in &vectors {
            if vector.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self {
            dimensions,
            count: vectors.len(),
            data,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Return the `k` stored vectors nearest to `query` as
    /// `(position, squared L2 distance)` pairs, ascending by distance, ties
    /// broken by lower position. `k` is capped at the number of stored
    /// vectors.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
    ) -> std::result::Result<Vec<(usize, f32)>, IndexError> {
        if k < 1 {
            return Err(IndexError::InvalidK { k });
        }
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimensions)
            .enumerate()
            .map(|(position, row)| (position, squared_l2(query, row)))
            .collect();

        // Ascending distance; equal distances resolve to the lower position
        // so results are deterministic.
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k.min(self.count));

        Ok(scored)
    }

    /// Write a binary snapshot: magic, vector count, dimension, then the
    /// flat little-endian `f32` payload in record order. The snapshot is
    /// written to a temp file and renamed into place so readers never see a
    /// partial index.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("idx.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(&INDEX_MAGIC)?;
            writer.write_all(&(self.count as u32).to_le_bytes())?;
            writer.write_all(&(self.dimensions as u32).to_le_bytes())?;
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Read a snapshot previously written by [`VectorIndex::persist`].
    /// Malformed input (wrong magic, zero dimension, a header whose claimed
    /// payload does not match the file size) fails with
    /// `IndexError::Corrupt`. The header is never trusted for allocation:
    /// the claimed payload is checked against the actual file length first,
    /// so a hostile header cannot force a huge reservation.
    pub fn restore(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| corrupt("header shorter than magic"))?;
        if magic != INDEX_MAGIC {
            return Err(corrupt("wrong magic bytes"));
        }

        let count = read_u32(&mut reader).map_err(|_| corrupt("missing vector count"))? as usize;
        let dimensions = read_u32(&mut reader).map_err(|_| corrupt("missing dimension"))? as usize;
        if count == 0 || dimensions == 0 {
            return Err(corrupt("zero vector count or dimension"));
        }

        let expected = count
            .checked_mul(dimensions)
            .ok_or_else(|| corrupt("header dimensions overflow"))?;
        let payload_bytes = expected
            .checked_mul(4)
            .ok_or_else(|| corrupt("header dimensions overflow"))?;
        let header_bytes = (INDEX_MAGIC.len() + 8) as u64;
        if file_len != header_bytes + payload_bytes as u64 {
            return Err(corrupt("payload size does not match header"));
        }

        let mut data = Vec::with_capacity(expected);
        let mut buf = [0u8; 4];
        for _ in 0..expected {
            reader
                .read_exact(&mut buf)
                .map_err(|_| corrupt("truncated payload"))?;
            data.push(f32::from_le_bytes(buf));
        }

        Ok(Self {
            dimensions,
            count,
            data,
        })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn read_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn corrupt(message: &str) -> ChronicleError {
    ChronicleError::Index(IndexError::Corrupt {
        message: message.to_string(),
    })
}
