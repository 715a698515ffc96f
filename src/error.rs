//! Centralized error handling for clustermap.
//!
//! Every failure is surfaced through [`MapError`] and the [`Result`] alias.
//! Library code never panics; all conditions propagate through `?`.
//!
//! ## Error Categories
//!
//! - **Malformed run lists** ([`MapError::MalformedRunList`]): the decoded run
//!   sequence is structurally inconsistent. Raised only while building a
//!   [`RangeReader`](crate::RangeReader); no partial reader is returned.
//! - **I/O Errors** ([`MapError::Io`]): the backing volume failed. The
//!   underlying error is propagated unchanged and exposed via `source()`.
//! - **Decompression Errors** ([`MapError::Decompression`]): a compression unit
//!   could not be reconstructed to its logical length.
//!
//! Read-time errors are per call. The mapping itself is immutable, so a
//! failed read can simply be retried or treated as an absent extent.
//!
//! ## Usage
//!
//! ```rust
//! use clustermap::{MapError, MappingConfig, RangeReaderBuilder, Run};
//!
//! // A two-cluster real run with nothing to complete its compression unit.
//! let runs = [Run::new(100, 2)];
//! let err = RangeReaderBuilder::new(MappingConfig::default())
//!     .build(&runs)
//!     .unwrap_err();
//!
//! match err {
//!     MapError::MalformedRunList(msg) => println!("rejected: {msg}"),
//!     other => eprintln!("unexpected: {other}"),
//! }
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for clustermap operations.
pub type Result<T> = std::result::Result<T, MapError>;

/// The error enum covering every failure domain of the crate.
///
/// This type is `Clone` so a failure can be shared between the threads of a
/// parallel read. I/O errors are wrapped in `Arc` to make that cheap.
#[derive(Debug, Clone)]
pub enum MapError {
    /// The decoded run list cannot describe a valid attribute layout.
    ///
    /// ## Common Causes
    ///
    /// - A real run shorter than a compression unit with no sparse run after it
    /// - A sparse run too short to complete the preceding compression unit
    /// - A sparse remainder that is not a whole number of compression units
    /// - Zero-length runs
    /// - Offset deltas that move the physical cursor below cluster zero
    /// - Lengths that overflow the configured cluster bound
    MalformedRunList(String),

    /// The backing volume reader failed.
    Io(Arc<io::Error>),

    /// A compression unit could not be reconstructed.
    ///
    /// Raised when the decompressor rejects its input or produces more bytes
    /// than the unit's logical length.
    Decompression(String),
}

impl MapError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRunList(msg.into())
    }

    pub(crate) fn decompression(msg: impl Into<String>) -> Self {
        Self::Decompression(msg.into())
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRunList(s) => write!(f, "Malformed Run List: {s}"),
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Decompression(s) => write!(f, "Decompression Error: {s}"),
        }
    }
}

impl std::error::Error for MapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MapError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_errors_expose_their_source() {
        let err = MapError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "I/O Error: short read");

        let cloned = err.clone();
        assert!(matches!(cloned, MapError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn structural_errors_have_no_source() {
        let err = MapError::malformed("sparse run too short");
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "Malformed Run List: sparse run too short");
    }
}
