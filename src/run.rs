//! Decoded attribute data runs.
//!
//! A run list is produced by an upstream decoder from the packed
//! `(header, length, offset)` byte stream of a non-resident attribute. This
//! crate only consumes the decoded pairs.

use serde::{Deserialize, Serialize};

/// One decoded data run: a signed cluster-offset delta plus a cluster length.
///
/// The delta is relative to the physical cursor left by the previous real
/// run. The decoder reports runs without physical backing with a delta of
/// exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Run {
    /// Signed offset, in clusters, from the previous run's physical start.
    pub offset_delta: i64,
    /// Length of the run in clusters.
    pub length: u64,
}

/// Classification of a run by its physical backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// The run is stored on disk starting `delta` clusters from the cursor.
    Real {
        /// Offset delta to apply to the physical cursor.
        delta: i64,
    },
    /// The run has no backing; its clusters read as zeros.
    Sparse,
}

impl Run {
    /// Creates a run from a decoded `(offset_delta, length)` pair.
    pub const fn new(offset_delta: i64, length: u64) -> Self {
        Self {
            offset_delta,
            length,
        }
    }

    /// Creates a sparse run of `length` clusters.
    pub const fn sparse(length: u64) -> Self {
        Self::new(0, length)
    }

    /// Classifies the run.
    ///
    /// This is the only place the decoder's zero-delta sentinel is read.
    pub const fn kind(&self) -> RunKind {
        if self.offset_delta == 0 {
            RunKind::Sparse
        } else {
            RunKind::Real {
                delta: self.offset_delta,
            }
        }
    }

    /// Returns true if the run has no physical backing.
    pub const fn is_sparse(&self) -> bool {
        matches!(self.kind(), RunKind::Sparse)
    }
}

impl From<(i64, u64)> for Run {
    fn from((offset_delta, length): (i64, u64)) -> Self {
        Self::new(offset_delta, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delta_is_sparse() {
        assert!(Run::new(0, 16).is_sparse());
        assert!(Run::sparse(3).is_sparse());
        assert_eq!(Run::new(-12, 4).kind(), RunKind::Real { delta: -12 });
        assert_eq!(Run::from((48, 1213)), Run::new(48, 1213));
    }
}
