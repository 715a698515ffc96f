//! Mapped spans of an attribute's logical cluster space.
//!
//! A [`MappedReader`] covers `[file_offset, file_offset + length)` clusters of
//! an attribute. How those clusters are backed is described by [`Mapping`]:
//! directly, through a compression unit, not at all, or by another
//! [`RangeReader`] nested inside the span.

use serde::{Deserialize, Serialize};

use crate::range_reader::RangeReader;

/// A byte-addressed extent produced by range aggregation.
///
/// Offsets are logical: a compressed span reports its decompressed extent,
/// not the size of its real clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Logical byte offset within the attribute.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
    /// True if the extent has no backing and reads as zeros.
    pub is_sparse: bool,
}

impl Range {
    /// Creates a range.
    pub const fn new(offset: u64, length: u64, is_sparse: bool) -> Self {
        Self {
            offset,
            length,
            is_sparse,
        }
    }

    /// One past the last byte of the range.
    pub const fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

/// How a span's clusters are backed.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapping {
    /// Clusters are stored 1:1 starting at `target_offset`.
    Direct {
        /// Physical cluster offset on the volume.
        target_offset: u64,
    },
    /// A compression unit whose first `compressed_length` real clusters,
    /// starting at `target_offset`, decompress to the span's full length.
    Compressed {
        /// Physical cluster offset of the compressed data.
        target_offset: u64,
        /// Number of real clusters holding the compressed stream.
        compressed_length: u64,
    },
    /// No backing; the span reads as zeros.
    Sparse,
    /// Reads and ranges delegate to a nested reader, clipped to the span.
    ///
    /// Offsets inside the nested reader are relative to the span's start.
    Composite(Box<RangeReader>),
}

/// One contiguous span of an attribute's logical cluster space.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedReader {
    /// Logical cluster offset within the attribute.
    pub file_offset: u64,
    /// Span length in clusters.
    pub length: u64,
    /// Bytes per cluster.
    pub cluster_size: u32,
    /// Physical backing of the span.
    pub mapping: Mapping,
}

impl MappedReader {
    /// A span stored uncompressed at `target_offset`.
    pub fn direct(file_offset: u64, target_offset: u64, length: u64, cluster_size: u32) -> Self {
        Self {
            file_offset,
            length,
            cluster_size,
            mapping: Mapping::Direct { target_offset },
        }
    }

    /// A compression unit of `length` clusters stored in `compressed_length`
    /// real clusters at `target_offset`.
    pub fn compressed(
        file_offset: u64,
        target_offset: u64,
        length: u64,
        compressed_length: u64,
        cluster_size: u32,
    ) -> Self {
        Self {
            file_offset,
            length,
            cluster_size,
            mapping: Mapping::Compressed {
                target_offset,
                compressed_length,
            },
        }
    }

    /// A span without backing.
    pub fn sparse(file_offset: u64, length: u64, cluster_size: u32) -> Self {
        Self {
            file_offset,
            length,
            cluster_size,
            mapping: Mapping::Sparse,
        }
    }

    /// A span backed by a nested reader.
    pub fn composite(file_offset: u64, length: u64, cluster_size: u32, reader: RangeReader) -> Self {
        Self {
            file_offset,
            length,
            cluster_size,
            mapping: Mapping::Composite(Box::new(reader)),
        }
    }

    /// One past the last logical cluster of the span.
    pub fn end(&self) -> u64 {
        self.file_offset.saturating_add(self.length)
    }

    /// Logical byte offset of the span.
    pub fn byte_offset(&self) -> u64 {
        self.file_offset.saturating_mul(u64::from(self.cluster_size))
    }

    /// Logical byte length of the span.
    pub fn byte_len(&self) -> u64 {
        self.length.saturating_mul(u64::from(self.cluster_size))
    }

    /// One past the last logical byte of the span.
    pub fn byte_end(&self) -> u64 {
        self.byte_offset().saturating_add(self.byte_len())
    }

    /// Physical cluster offset; `0` for sparse and composite spans.
    pub fn target_offset(&self) -> u64 {
        match self.mapping {
            Mapping::Direct { target_offset } | Mapping::Compressed { target_offset, .. } => {
                target_offset
            }
            Mapping::Sparse | Mapping::Composite(_) => 0,
        }
    }

    /// Real clusters of a compression unit; `0` unless the span is compressed.
    pub fn compressed_length(&self) -> u64 {
        match self.mapping {
            Mapping::Compressed {
                compressed_length, ..
            } => compressed_length,
            _ => 0,
        }
    }

    /// True for spans with no backing at all.
    pub fn is_sparse(&self) -> bool {
        matches!(self.mapping, Mapping::Sparse)
    }

    /// True for compression units.
    pub fn is_compressed(&self) -> bool {
        matches!(self.mapping, Mapping::Compressed { .. })
    }

    /// The nested reader of a composite span.
    pub fn nested(&self) -> Option<&RangeReader> {
        match &self.mapping {
            Mapping::Composite(reader) => Some(reader.as_ref()),
            _ => None,
        }
    }

    /// Flattens the span into byte ranges covering exactly its extent.
    ///
    /// Leaves yield a single range. A composite span aggregates its nested
    /// reader, clips the result to its own length and fills every uncovered
    /// gap with a sparse range.
    pub fn ranges(&self) -> Vec<Range> {
        let base = self.byte_offset();
        let limit = self.byte_len();

        let nested = match &self.mapping {
            Mapping::Direct { .. } | Mapping::Compressed { .. } => {
                return vec![Range::new(base, limit, false)];
            }
            Mapping::Sparse => return vec![Range::new(base, limit, true)],
            Mapping::Composite(reader) => reader,
        };

        let mut result = Vec::new();
        let mut cursor = 0;

        for range in nested.ranges() {
            if range.offset >= limit {
                break;
            }
            let start = range.offset.max(cursor);
            let end = range.end().min(limit);
            if end <= start {
                continue;
            }
            if start > cursor {
                result.push(Range::new(base + cursor, start - cursor, true));
            }
            result.push(Range::new(base + start, end - start, range.is_sparse));
            cursor = end;
        }

        if cursor < limit {
            result.push(Range::new(base + cursor, limit - cursor, true));
        }
        result
    }
}
