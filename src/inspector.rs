// src/inspector.rs

//! Tools for inspecting the layout of a built [`RangeReader`].
//! Useful for sparse-file analysis and for checking how a run list was merged.

use serde::Serialize;

use crate::mapped::{MappedReader, Mapping};
use crate::range_reader::RangeReader;

/// A structural report of a mapped attribute.
#[derive(Debug, Clone, Serialize)]
pub struct MappingReport {
    /// Bytes per cluster (0 for an empty reader).
    pub cluster_size: u32,
    /// Logical length of the attribute in bytes.
    pub logical_bytes: u64,
    /// Bytes reported as backed by the range view.
    pub allocated_bytes: u64,
    /// Bytes reported as sparse by the range view.
    pub sparse_bytes: u64,
    /// Span counts by kind, including nested spans.
    pub counts: SpanCounts,
    /// The hierarchical tree of spans.
    pub spans: Vec<SpanInfo>,
}

/// Number of spans of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpanCounts {
    /// Uncompressed spans.
    pub direct: usize,
    /// Compression units.
    pub compressed: usize,
    /// Pure sparse spans.
    pub sparse: usize,
    /// Spans delegating to a nested reader.
    pub composite: usize,
}

/// Metadata for a single span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanInfo {
    /// Logical cluster offset.
    pub file_offset: u64,
    /// Length in clusters.
    pub length: u64,
    /// Physical cluster offset (0 when there is none).
    pub target_offset: u64,
    /// Real clusters of a compression unit.
    pub compressed_length: u64,
    /// "direct", "compressed", "sparse" or "composite".
    pub kind: &'static str,
    /// Spans of the nested reader.
    pub children: Vec<SpanInfo>,
}

/// The inspector tool.
#[derive(Debug)]
pub struct MappingInspector;

impl MappingInspector {
    /// Analyzes a reader and returns a structural report.
    pub fn inspect(reader: &RangeReader) -> MappingReport {
        let mut counts = SpanCounts::default();
        let spans = reader
            .runs()
            .iter()
            .map(|node| Self::inspect_node(node, &mut counts))
            .collect();

        let (sparse_bytes, allocated_bytes) =
            reader
                .ranges()
                .iter()
                .fold((0u64, 0u64), |(sparse, allocated), range| {
                    if range.is_sparse {
                        (sparse + range.length, allocated)
                    } else {
                        (sparse, allocated + range.length)
                    }
                });

        MappingReport {
            cluster_size: reader.cluster_size().unwrap_or(0),
            logical_bytes: reader.len(),
            allocated_bytes,
            sparse_bytes,
            counts,
            spans,
        }
    }

    fn inspect_node(node: &MappedReader, counts: &mut SpanCounts) -> SpanInfo {
        let (kind, children) = match &node.mapping {
            Mapping::Direct { .. } => {
                counts.direct += 1;
                ("direct", Vec::new())
            }
            Mapping::Compressed { .. } => {
                counts.compressed += 1;
                ("compressed", Vec::new())
            }
            Mapping::Sparse => {
                counts.sparse += 1;
                ("sparse", Vec::new())
            }
            Mapping::Composite(nested) => {
                counts.composite += 1;
                let children = nested
                    .runs()
                    .iter()
                    .map(|child| Self::inspect_node(child, counts))
                    .collect();
                ("composite", children)
            }
        };

        SpanInfo {
            file_offset: node.file_offset,
            length: node.length,
            target_offset: node.target_offset(),
            compressed_length: node.compressed_length(),
            kind,
            children,
        }
    }
}

impl std::fmt::Display for MappingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== CLUSTER MAP REPORT ===")?;
        writeln!(f, "Cluster Size:   {}", self.cluster_size)?;
        writeln!(f, "Logical Bytes:  {}", self.logical_bytes)?;
        writeln!(f, "Allocated:      {}", self.allocated_bytes)?;
        writeln!(f, "Sparse:         {}", self.sparse_bytes)?;
        writeln!(
            f,
            "Spans:          {} direct, {} compressed, {} sparse, {} composite",
            self.counts.direct, self.counts.compressed, self.counts.sparse, self.counts.composite
        )?;
        writeln!(f, "\n[SPAN LAYOUT]")?;
        for (i, span) in self.spans.iter().enumerate() {
            span.fmt_recursive(f, "", i + 1 == self.spans.len())?;
        }
        Ok(())
    }
}

impl SpanInfo {
    fn fmt_recursive(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
    ) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };

        write!(
            f,
            "{}{}[{}] VCN {}..{}",
            prefix,
            connector,
            self.kind,
            self.file_offset,
            self.file_offset + self.length
        )?;
        match self.kind {
            "direct" => writeln!(f, " -> LCN {}", self.target_offset)?,
            "compressed" => writeln!(
                f,
                " -> LCN {} ({} real clusters)",
                self.target_offset, self.compressed_length
            )?,
            _ => writeln!(f)?,
        }

        for (i, child) in self.children.iter().enumerate() {
            let is_last_child = i == self.children.len() - 1;
            child.fmt_recursive(f, &format!("{}{}", prefix, child_prefix), is_last_child)?;
        }
        Ok(())
    }
}
