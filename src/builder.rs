//! Construction of a [`RangeReader`] from a decoded run list.
//!
//! For compressed attributes the builder recognises the NTFS compression-unit
//! signature: a real run whose length is not a whole number of units is
//! completed by the sparse run that follows it. The real clusters of that
//! trailing partial unit become one [`Mapping::Compressed`] span, the leading
//! whole units one [`Mapping::Direct`] span, and whatever is left of the sparse
//! run one [`Mapping::Sparse`] span.
//!
//! ```text
//! runs:   [ real 47 ][ sparse 1 ][ real 1213            ][ sparse 3 ]
//! spans:  [ 32 ][ 16/15 ]        [ 1200           ][ 16/13 ]
//! ```
//!
//! Run offset deltas are relative to the physical start of the previous real
//! run. Spans carved out of one run sit at increasing offsets from that start.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::compression::{Decompressor, Lznt1};
use crate::config::MappingConfig;
use crate::error::{MapError, Result};
use crate::mapped::MappedReader;
use crate::range_reader::RangeReader;
use crate::run::{Run, RunKind};
use crate::volume::VolumeReader;

/// Builds [`RangeReader`]s for one volume geometry.
///
/// ## Examples
///
/// ```rust
/// use clustermap::{MappingConfig, RangeReaderBuilder, Run};
///
/// let runs = [Run::new(1940823, 2), Run::sparse(30)];
/// let reader = RangeReaderBuilder::new(MappingConfig::default().with_cluster_size(1024))
///     .build(&runs)?;
///
/// let spans = reader.runs();
/// assert_eq!(spans.len(), 2);
/// assert_eq!(spans[0].compressed_length(), 2);
/// assert!(spans[1].is_sparse());
/// # Ok::<(), clustermap::MapError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RangeReaderBuilder {
    config: MappingConfig,
    volume: Option<Arc<dyn VolumeReader>>,
    decompressor: Arc<dyn Decompressor>,
}

impl RangeReaderBuilder {
    /// Creates a builder without a backing volume, decompressing with LZNT1.
    pub fn new(config: MappingConfig) -> Self {
        Self {
            config,
            volume: None,
            decompressor: Arc::new(Lznt1),
        }
    }

    /// Sets the volume that physical spans are read from.
    pub fn volume(mut self, volume: Arc<dyn VolumeReader>) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Sets the codec for compressed spans.
    pub fn decompressor(mut self, decompressor: Arc<dyn Decompressor>) -> Self {
        self.decompressor = decompressor;
        self
    }

    /// The geometry runs are interpreted against.
    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Lays out `runs` as spans.
    ///
    /// # Errors
    /// Returns `MapError::MalformedRunList` if the run list cannot describe a
    /// valid layout. No partial reader is produced.
    pub fn build(&self, runs: &[Run]) -> Result<RangeReader> {
        let nodes = self.layout(runs).inspect_err(|err| {
            warn!(runs = runs.len(), error = %err, "rejecting run list");
        })?;

        let reader = RangeReader::new(nodes, self.volume.clone())
            .with_decompressor(Arc::clone(&self.decompressor));
        debug!(
            runs = runs.len(),
            spans = reader.runs().len(),
            clusters = reader.len_clusters(),
            "built range reader"
        );
        Ok(reader)
    }

    fn layout(&self, runs: &[Run]) -> Result<Vec<MappedReader>> {
        self.config.validate()?;
        let mut layout = Layout::new(&self.config);

        match self.config.compression_unit {
            Some(unit) => merge_compression_units(runs, unit, &mut layout)?,
            None => map_uncompressed(runs, &mut layout)?,
        }
        Ok(layout.nodes)
    }
}

fn map_uncompressed(runs: &[Run], layout: &mut Layout) -> Result<()> {
    for (idx, run) in runs.iter().enumerate() {
        check_length(run, idx)?;
        match run.kind() {
            RunKind::Real { delta } => {
                layout.seek(delta, idx)?;
                layout.push_direct(0, run.length)?;
            }
            RunKind::Sparse => layout.push_sparse(run.length)?,
        }
    }
    Ok(())
}

fn merge_compression_units(runs: &[Run], unit: u64, layout: &mut Layout) -> Result<()> {
    let mut idx = 0;

    while idx < runs.len() {
        let run = runs[idx];
        check_length(&run, idx)?;

        let delta = match run.kind() {
            RunKind::Sparse => {
                layout.push_sparse(run.length)?;
                idx += 1;
                continue;
            }
            RunKind::Real { delta } => delta,
        };

        layout.seek(delta, idx)?;

        let partial = run.length % unit;
        let whole = run.length - partial;
        if whole > 0 {
            layout.push_direct(0, whole)?;
        }
        if partial == 0 {
            idx += 1;
            continue;
        }

        // The trailing partial unit must be completed by the next run.
        let needed = unit - partial;
        let filler = match runs.get(idx + 1) {
            Some(next) if next.is_sparse() => *next,
            Some(_) => {
                return Err(MapError::malformed(format!(
                    "run {idx} ends inside a compression unit but is followed by a real run"
                )));
            }
            None => {
                return Err(MapError::malformed(format!(
                    "run {idx} ends inside a compression unit at the end of the run list"
                )));
            }
        };
        check_length(&filler, idx + 1)?;
        if filler.length < needed {
            return Err(MapError::malformed(format!(
                "sparse run {} has {} clusters, {needed} needed to complete the unit of run {idx}",
                idx + 1,
                filler.length
            )));
        }

        let leftover = filler.length - needed;
        if leftover % unit != 0 {
            return Err(MapError::malformed(format!(
                "sparse run {} leaves {leftover} clusters after completing a unit, \
                 not a multiple of the {unit}-cluster unit",
                idx + 1
            )));
        }

        layout.push_compressed(whole, unit, partial)?;
        if leftover > 0 {
            layout.push_sparse(leftover)?;
        }
        idx += 2;
    }
    Ok(())
}

fn check_length(run: &Run, idx: usize) -> Result<()> {
    if run.length == 0 {
        return Err(MapError::malformed(format!("run {idx} has zero length")));
    }
    Ok(())
}

/// Cursor state while emitting spans.
struct Layout {
    cluster_size: u32,
    max_clusters: u64,
    physical_limit: u64,
    /// Physical start of the current real run.
    target_cursor: u64,
    /// Next logical cluster to map.
    file_cursor: u64,
    nodes: Vec<MappedReader>,
}

impl Layout {
    fn new(config: &MappingConfig) -> Self {
        Self {
            cluster_size: config.cluster_size,
            max_clusters: config.max_clusters,
            physical_limit: u64::MAX / u64::from(config.cluster_size),
            target_cursor: 0,
            file_cursor: 0,
            nodes: Vec::new(),
        }
    }

    fn seek(&mut self, delta: i64, idx: usize) -> Result<()> {
        self.target_cursor = self
            .target_cursor
            .checked_add_signed(delta)
            .filter(|&target| target <= self.physical_limit)
            .ok_or_else(|| {
                MapError::malformed(format!(
                    "run {idx} moves the physical cursor from cluster {} by {delta} out of range",
                    self.target_cursor
                ))
            })?;
        Ok(())
    }

    /// Physical cluster `offset` clusters into the current run, checking that
    /// `real` clusters from there stay addressable.
    fn target(&self, offset: u64, real: u64) -> Result<u64> {
        let start = self.target_cursor.checked_add(offset);
        match start.and_then(|s| s.checked_add(real)) {
            Some(end) if end <= self.physical_limit => Ok(self.target_cursor + offset),
            _ => Err(MapError::malformed(format!(
                "physical extent at cluster {} overflows byte addressing",
                self.target_cursor
            ))),
        }
    }

    fn push_direct(&mut self, offset: u64, length: u64) -> Result<()> {
        let target_offset = self.target(offset, length)?;
        let node = MappedReader::direct(self.file_cursor, target_offset, length, self.cluster_size);
        self.push(node)
    }

    fn push_compressed(&mut self, offset: u64, unit: u64, real: u64) -> Result<()> {
        let target_offset = self.target(offset, real)?;
        let node = MappedReader::compressed(
            self.file_cursor,
            target_offset,
            unit,
            real,
            self.cluster_size,
        );
        self.push(node)
    }

    fn push_sparse(&mut self, length: u64) -> Result<()> {
        if self.nodes.last().is_some_and(MappedReader::is_sparse) {
            let end = self.advance(length)?;
            if let Some(last) = self.nodes.last_mut() {
                last.length = end - last.file_offset;
                trace!(file_offset = last.file_offset, length = last.length, "extended sparse span");
            }
            return Ok(());
        }
        let node = MappedReader::sparse(self.file_cursor, length, self.cluster_size);
        self.push(node)
    }

    fn push(&mut self, node: MappedReader) -> Result<()> {
        self.advance(node.length)?;
        trace!(
            file_offset = node.file_offset,
            target_offset = node.target_offset(),
            length = node.length,
            compressed_length = node.compressed_length(),
            sparse = node.is_sparse(),
            "emitted span"
        );
        self.nodes.push(node);
        Ok(())
    }

    fn advance(&mut self, length: u64) -> Result<u64> {
        let end = self
            .file_cursor
            .checked_add(length)
            .filter(|&end| end <= self.max_clusters)
            .ok_or_else(|| {
                MapError::malformed(format!(
                    "attribute length exceeds the {}-cluster bound",
                    self.max_clusters
                ))
            })?;
        self.file_cursor = end;
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RangeReaderBuilder {
        RangeReaderBuilder::new(MappingConfig::default().with_cluster_size(1024))
    }

    #[test]
    fn aligned_real_run_needs_no_lookahead() -> Result<()> {
        // The following real run is never treated as filler.
        let reader = builder().build(&[Run::new(100, 32), Run::new(50, 16)])?;
        assert_eq!(
            reader.runs(),
            &[
                MappedReader::direct(0, 100, 32, 1024),
                MappedReader::direct(32, 150, 16, 1024),
            ]
        );
        Ok(())
    }

    #[test]
    fn sub_unit_run_becomes_single_compressed_span() -> Result<()> {
        let reader = builder().build(&[Run::new(7, 3), Run::sparse(13)])?;
        assert_eq!(reader.runs(), &[MappedReader::compressed(0, 7, 16, 3, 1024)]);
        Ok(())
    }

    #[test]
    fn sparse_leftover_coalesces_with_following_sparse_run() -> Result<()> {
        let reader = builder().build(&[Run::new(7, 3), Run::sparse(29), Run::sparse(32)])?;
        assert_eq!(
            reader.runs(),
            &[
                MappedReader::compressed(0, 7, 16, 3, 1024),
                MappedReader::sparse(16, 48, 1024),
            ]
        );
        Ok(())
    }

    #[test]
    fn negative_delta_is_relative_to_previous_run_start() -> Result<()> {
        let reader = builder().build(&[Run::new(1000, 16), Run::new(-400, 16)])?;
        assert_eq!(reader.runs()[1].target_offset(), 600);
        Ok(())
    }

    #[test]
    fn physical_cursor_cannot_go_negative() {
        let err = builder().build(&[Run::new(10, 16), Run::new(-11, 16)]);
        assert!(matches!(err, Err(MapError::MalformedRunList(_))));
    }

    #[test]
    fn length_bound_is_enforced() {
        let builder = RangeReaderBuilder::new(MappingConfig::default().with_max_clusters(64));
        assert!(builder.build(&[Run::new(10, 64)]).is_ok());
        assert!(builder.build(&[Run::new(10, 64), Run::sparse(16)]).is_err());
    }

    #[test]
    fn uncompressed_mode_maps_runs_verbatim() -> Result<()> {
        let builder = RangeReaderBuilder::new(MappingConfig::uncompressed(4096));
        let reader = builder.build(&[Run::new(20, 5), Run::sparse(3), Run::new(-5, 2)])?;
        assert_eq!(
            reader.runs(),
            &[
                MappedReader::direct(0, 20, 5, 4096),
                MappedReader::sparse(5, 3, 4096),
                MappedReader::direct(8, 15, 2, 4096),
            ]
        );
        Ok(())
    }
}
