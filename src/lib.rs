//! # clustermap
//!
//! Logical-to-physical cluster mapping for non-resident NTFS attributes.
//!
//! ## Overview
//!
//! A non-resident attribute stores its data as a list of *runs*: stretches of
//! clusters that are either on disk somewhere or absent (sparse). Compressed
//! attributes add a twist: every compression unit (usually 16 clusters) is
//! either stored 1:1, or stored in fewer real clusters followed by sparse
//! padding. This crate turns a decoded run list into a [`RangeReader`] that
//! answers two questions for any byte of the attribute:
//!
//! *   **Where is it?** Which physical clusters back it, if any.
//! *   **What is it?** Stored directly, compressed, or sparse.
//!
//! ## Architecture
//!
//! ```text
//! [Run; n] ──RangeReaderBuilder──> RangeReader ──ranges()──> [Range; m]
//!                                       │
//!                                       └──read_at()──> VolumeReader + Decompressor
//! ```
//!
//! *   [`Run`]: one decoded `(offset_delta, length)` pair. A zero delta marks a
//!     sparse run.
//! *   [`MappedReader`]: one span of logical clusters and its [`Mapping`]:
//!     direct, compressed, sparse, or composite (backed by a nested
//!     [`RangeReader`], as used for attribute lists).
//! *   [`RangeReader`]: ordered spans plus the volume and decompressor used
//!     for reads. Immutable and `Send + Sync` once built.
//! *   [`RangeReaderBuilder`]: the compression-unit merge.
//!
//! ## Usage
//!
//! ```rust
//! use clustermap::{MappingConfig, Range, RangeReaderBuilder, Run};
//!
//! let runs = [Run::new(474540, 47), Run::sparse(1), Run::new(48, 1213), Run::sparse(3)];
//! let reader = RangeReaderBuilder::new(MappingConfig::default().with_cluster_size(1024))
//!     .build(&runs)?;
//!
//! assert_eq!(reader.runs().len(), 4);
//! assert_eq!(reader.ranges()[1], Range::new(32768, 16384, false));
//! # Ok::<(), clustermap::MapError>(())
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: `debug` when a reader is built, `warn`
//! when a run list is rejected and `trace` per emitted span and per dispatched
//! read. No subscriber is installed.
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` is the memory map in
//!   [`MmapVolume::open`].
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a [`MapError`] type.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod builder;
pub mod compression;
pub mod config;
pub mod error;
pub mod inspector;
pub mod mapped;
pub mod range_reader;
pub mod run;
pub mod volume;

pub use builder::RangeReaderBuilder;
pub use compression::{Decompressor, Lznt1};
pub use config::MappingConfig;
pub use error::{MapError, Result};
pub use inspector::{MappingInspector, MappingReport};
pub use mapped::{MappedReader, Mapping, Range};
pub use range_reader::RangeReader;
pub use run::{Run, RunKind};
pub use volume::{MmapVolume, NullReader, VolumeReader};

/// Constants used throughout the library.
pub mod constants {
    /// Default bytes per cluster.
    pub const DEFAULT_CLUSTER_SIZE: u32 = 4096;

    /// Default clusters per compression unit (NTFS uses `2^4`).
    pub const DEFAULT_COMPRESSION_UNIT: u64 = 16;
}
