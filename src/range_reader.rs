//! The attribute-level reader.
//!
//! A [`RangeReader`] holds an ordered list of [`MappedReader`] spans together
//! with the volume and decompressor used to read them. It is immutable after
//! construction and safe to share between threads.

use std::io;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::trace;

use crate::compression::{Decompressor, Lznt1};
use crate::error::{MapError, Result};
use crate::mapped::{MappedReader, Mapping, Range};
use crate::volume::{NullReader, VolumeReader};

/// Ordered, non-overlapping spans of an attribute's logical cluster space.
///
/// Readers built by [`RangeReaderBuilder`](crate::RangeReaderBuilder) are
/// contiguous from cluster zero. Readers assembled with
/// [`RangeReader::from_nodes`] may leave gaps, which read as zeros.
#[derive(Debug, Clone)]
pub struct RangeReader {
    runs: Vec<MappedReader>,
    volume: Option<Arc<dyn VolumeReader>>,
    decompressor: Arc<dyn Decompressor>,
}

impl Default for RangeReader {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

impl PartialEq for RangeReader {
    fn eq(&self, other: &Self) -> bool {
        self.runs == other.runs
    }
}

impl RangeReader {
    pub(crate) fn new(runs: Vec<MappedReader>, volume: Option<Arc<dyn VolumeReader>>) -> Self {
        Self {
            runs,
            volume,
            decompressor: Arc::new(Lznt1),
        }
    }

    /// Assembles a reader from explicit spans, typically to nest it inside a
    /// composite [`MappedReader`].
    ///
    /// Gaps between spans are allowed; they read as zeros and aggregate as
    /// sparse ranges.
    ///
    /// # Errors
    /// Returns `MapError::MalformedRunList` if spans are empty, overlap, are
    /// out of order, disagree on the cluster size, describe an invalid
    /// compression unit, or reach past byte addressing.
    pub fn from_nodes(
        nodes: Vec<MappedReader>,
        volume: Option<Arc<dyn VolumeReader>>,
    ) -> Result<Self> {
        let mut end = 0;
        for (idx, node) in nodes.iter().enumerate() {
            if node.cluster_size == 0 {
                return Err(MapError::malformed(format!("span {idx} has a zero cluster size")));
            }
            if node.cluster_size != nodes[0].cluster_size {
                return Err(MapError::malformed(format!(
                    "span {idx} uses cluster size {} instead of {}",
                    node.cluster_size, nodes[0].cluster_size
                )));
            }
            if node.length == 0 {
                return Err(MapError::malformed(format!("span {idx} has zero length")));
            }
            if node.file_offset < end {
                return Err(MapError::malformed(format!(
                    "span {idx} starts at cluster {} inside the previous span ending at {end}",
                    node.file_offset
                )));
            }

            let limit = u64::MAX / u64::from(node.cluster_size);
            end = node
                .file_offset
                .checked_add(node.length)
                .filter(|&end| end <= limit)
                .ok_or_else(|| {
                    MapError::malformed(format!("span {idx} overflows byte addressing"))
                })?;

            let (target_offset, real) = match node.mapping {
                Mapping::Direct { target_offset } => (target_offset, node.length),
                Mapping::Compressed {
                    target_offset,
                    compressed_length,
                } => {
                    if compressed_length == 0 || compressed_length >= node.length {
                        return Err(MapError::malformed(format!(
                            "span {idx} compresses {} clusters into {compressed_length}",
                            node.length
                        )));
                    }
                    (target_offset, compressed_length)
                }
                Mapping::Sparse | Mapping::Composite(_) => continue,
            };
            if target_offset.checked_add(real).is_none_or(|end| end > limit) {
                return Err(MapError::malformed(format!(
                    "span {idx} physical extent at cluster {target_offset} overflows byte addressing"
                )));
            }
        }
        Ok(Self::new(nodes, volume))
    }

    /// Replaces the codec used for compressed spans.
    pub fn with_decompressor(mut self, decompressor: Arc<dyn Decompressor>) -> Self {
        self.decompressor = decompressor;
        self
    }

    /// The spans, ascending by logical offset.
    pub fn runs(&self) -> &[MappedReader] {
        &self.runs
    }

    /// The codec used for compressed spans.
    pub fn decompressor(&self) -> &dyn Decompressor {
        self.decompressor.as_ref()
    }

    /// Bytes per cluster, or `None` for an empty reader.
    pub fn cluster_size(&self) -> Option<u32> {
        self.runs.first().map(|node| node.cluster_size)
    }

    /// Logical length in clusters.
    pub fn len_clusters(&self) -> u64 {
        self.runs.last().map_or(0, MappedReader::end)
    }

    /// Logical length in bytes.
    pub fn len(&self) -> u64 {
        self.runs.last().map_or(0, MappedReader::byte_end)
    }

    /// Returns true if the reader maps no clusters.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Flattens every span into ascending, contiguous byte ranges covering
    /// `[0, len())`. Gaps left by [`RangeReader::from_nodes`] are reported as
    /// sparse.
    pub fn ranges(&self) -> Vec<Range> {
        let mut result = Vec::with_capacity(self.runs.len());
        let mut cursor = 0;
        for node in &self.runs {
            let start = node.byte_offset();
            if start > cursor {
                result.push(Range::new(cursor, start - cursor, true));
            }
            result.extend(node.ranges());
            cursor = node.byte_end();
        }
        result
    }

    /// Reads logical bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is short only at the end of the
    /// attribute. Gaps between spans read as zeros.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let end = self.len();
        if offset >= end || buf.is_empty() {
            return Ok(0);
        }
        let want = to_usize((end - offset).min(buf.len() as u64))?;
        let buf = &mut buf[..want];

        let mut idx = self.runs.partition_point(|node| node.byte_end() <= offset);
        let mut pos = offset;
        let mut written = 0;

        while written < want {
            let remaining = want - written;
            let Some(node) = self.runs.get(idx) else {
                buf[written..].fill(0);
                break;
            };

            let node_start = node.byte_offset();
            if node_start > pos {
                let gap = to_usize((node_start - pos).min(remaining as u64))?;
                buf[written..written + gap].fill(0);
                written += gap;
                pos += gap as u64;
                continue;
            }

            let rel = pos - node_start;
            let take = to_usize((node.byte_len() - rel).min(remaining as u64))?;
            self.read_node(node, rel, &mut buf[written..written + take])?;
            written += take;
            pos += take as u64;
            idx += 1;
        }

        Ok(want)
    }

    /// Reads up to `len` logical bytes at `offset` into a new buffer.
    pub fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let available = self.len().saturating_sub(offset);
        let mut buf = vec![0u8; to_usize(available.min(len as u64))?];
        let n = self.read_at(offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Reads the whole attribute, reconstructing spans in parallel.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let parts = self
            .runs
            .par_iter()
            .map(|node| -> Result<(u64, Vec<u8>)> {
                let mut part = vec![0u8; to_usize(node.byte_len())?];
                self.read_node(node, 0, &mut part)?;
                Ok((node.byte_offset(), part))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut out = vec![0u8; to_usize(self.len())?];
        for (offset, part) in parts {
            let start = to_usize(offset)?;
            out[start..start + part.len()].copy_from_slice(&part);
        }
        Ok(out)
    }

    /// Fills `out` from `rel` bytes into `node`. The caller keeps
    /// `rel + out.len()` within the span.
    fn read_node(&self, node: &MappedReader, rel: u64, out: &mut [u8]) -> Result<()> {
        let cluster_size = u64::from(node.cluster_size);
        trace!(
            file_offset = node.file_offset,
            rel,
            len = out.len(),
            "dispatching span read"
        );

        match &node.mapping {
            Mapping::Direct { target_offset } => {
                let physical = target_offset.saturating_mul(cluster_size).saturating_add(rel);
                self.volume()?.read_exact_at(physical, out)
            }
            Mapping::Compressed {
                target_offset,
                compressed_length,
            } => {
                let mut raw = vec![0u8; to_usize(compressed_length.saturating_mul(cluster_size))?];
                self.volume()?
                    .read_exact_at(target_offset.saturating_mul(cluster_size), &mut raw)?;

                let unit_len = to_usize(node.byte_len())?;
                let unit = self.decompressor.decompress(&raw, unit_len)?;
                if unit.len() != unit_len {
                    return Err(MapError::decompression(format!(
                        "{} returned {} bytes for a {unit_len}-byte unit at cluster {}",
                        self.decompressor.name(),
                        unit.len(),
                        node.file_offset
                    )));
                }

                let start = to_usize(rel)?;
                out.copy_from_slice(&unit[start..start + out.len()]);
                Ok(())
            }
            Mapping::Sparse => NullReader.read_exact_at(rel, out),
            Mapping::Composite(nested) => {
                out.fill(0);
                nested.read_at(rel, out).map(|_| ())
            }
        }
    }

    fn volume(&self) -> Result<&dyn VolumeReader> {
        self.volume.as_deref().ok_or_else(|| {
            MapError::from(io::Error::new(
                io::ErrorKind::NotFound,
                "span has physical backing but no volume reader was supplied",
            ))
        })
    }
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        MapError::from(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("extent of {value} bytes exceeds addressable memory"),
        ))
    })
}
