//! Mapping configuration.
//!
//! [`MappingConfig`] carries the volume geometry a run list is interpreted
//! against. It is plain data, so it can be embedded in a caller's own
//! configuration file through serde.

use crate::constants::{DEFAULT_CLUSTER_SIZE, DEFAULT_COMPRESSION_UNIT};
use crate::error::{MapError, Result};
use serde::{Deserialize, Serialize};

/// Geometry and bounds used when building a [`RangeReader`](crate::RangeReader).
///
/// ## Examples
///
/// ```rust
/// use clustermap::MappingConfig;
///
/// let config = MappingConfig::default()
///     .with_cluster_size(1024)
///     .with_compression_unit(16);
/// assert_eq!(config.unit_bytes(), Some(16 * 1024));
///
/// let plain = MappingConfig::uncompressed(4096);
/// assert_eq!(plain.compression_unit, None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Bytes per cluster.
    pub cluster_size: u32,
    /// Clusters per compression unit, or `None` for an uncompressed attribute.
    pub compression_unit: Option<u64>,
    /// Upper bound on the attribute's total length in clusters.
    pub max_clusters: u64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            cluster_size: DEFAULT_CLUSTER_SIZE,
            compression_unit: Some(DEFAULT_COMPRESSION_UNIT),
            max_clusters: max_clusters_for(DEFAULT_CLUSTER_SIZE),
        }
    }
}

impl MappingConfig {
    /// Configuration for an attribute without compression.
    pub fn uncompressed(cluster_size: u32) -> Self {
        Self {
            cluster_size,
            compression_unit: None,
            max_clusters: max_clusters_for(cluster_size),
        }
    }

    /// Sets the cluster size and rescales `max_clusters` to the largest
    /// length whose byte extent fits in a `u64`.
    pub fn with_cluster_size(mut self, cluster_size: u32) -> Self {
        self.cluster_size = cluster_size;
        self.max_clusters = max_clusters_for(cluster_size);
        self
    }

    /// Sets the compression unit size in clusters.
    pub fn with_compression_unit(mut self, clusters: u64) -> Self {
        self.compression_unit = Some(clusters);
        self
    }

    /// Treats the attribute as uncompressed.
    pub fn without_compression(mut self) -> Self {
        self.compression_unit = None;
        self
    }

    /// Caps the total attribute length in clusters.
    pub fn with_max_clusters(mut self, max_clusters: u64) -> Self {
        self.max_clusters = max_clusters;
        self
    }

    /// Size of one compression unit in bytes.
    pub fn unit_bytes(&self) -> Option<u64> {
        self.compression_unit
            .map(|unit| unit.saturating_mul(u64::from(self.cluster_size)))
    }

    /// Checks the geometry before any run is processed.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_size == 0 {
            return Err(MapError::malformed("cluster size must be non-zero"));
        }
        if self.compression_unit == Some(0) {
            return Err(MapError::malformed("compression unit must be non-zero"));
        }
        if self.max_clusters > max_clusters_for(self.cluster_size) {
            return Err(MapError::malformed(format!(
                "max_clusters {} overflows byte addressing at cluster size {}",
                self.max_clusters, self.cluster_size
            )));
        }
        Ok(())
    }
}

fn max_clusters_for(cluster_size: u32) -> u64 {
    u64::MAX / u64::from(cluster_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_ntfs_geometry() -> Result<()> {
        let config = MappingConfig::default();
        assert_eq!(config.cluster_size, 4096);
        assert_eq!(config.compression_unit, Some(16));
        config.validate()
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(MappingConfig::uncompressed(0).validate().is_err());
        assert!(
            MappingConfig::default()
                .with_compression_unit(0)
                .validate()
                .is_err()
        );
        assert!(
            MappingConfig::default()
                .with_max_clusters(u64::MAX)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn rescales_bound_with_cluster_size() {
        let config = MappingConfig::default().with_cluster_size(512);
        assert_eq!(config.max_clusters, u64::MAX / 512);
    }
}
