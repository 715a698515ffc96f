#![allow(missing_docs)]

use std::io::Write;
use std::sync::Arc;

use clustermap::{
    Decompressor, MapError, MappedReader, MappingConfig, MmapVolume, RangeReader,
    RangeReaderBuilder, Result, Run, VolumeReader,
};

const CLUSTER: usize = 16;
const UNIT: u64 = 4;

/// Volume layout (16-byte clusters):
/// - clusters 2..6: plain data, byte value = cluster number
/// - cluster 6: an LZNT1 stream decoding to "abcabcabc"
fn volume_image() -> Vec<u8> {
    let mut image = vec![0u8; 8 * CLUSTER];
    for cluster in 2..6 {
        image[cluster * CLUSTER..(cluster + 1) * CLUSTER].fill(cluster as u8);
    }
    let stream = [0x05, 0xB0, 0x08, b'a', b'b', b'c', 0x03, 0x20];
    image[6 * CLUSTER..6 * CLUSTER + stream.len()].copy_from_slice(&stream);
    image
}

fn config() -> MappingConfig {
    MappingConfig::default()
        .with_cluster_size(CLUSTER as u32)
        .with_compression_unit(UNIT)
}

/// Four direct clusters at LCN 2, a unit compressed into LCN 6, then one sparse unit.
fn runs() -> [Run; 2] {
    [Run::new(2, 5), Run::sparse(3 + UNIT)]
}

fn expected_attribute() -> Vec<u8> {
    let mut expected = Vec::new();
    for cluster in 2u8..6 {
        expected.extend(std::iter::repeat_n(cluster, CLUSTER));
    }
    let mut unit = b"abcabcabc".to_vec();
    unit.resize(UNIT as usize * CLUSTER, 0);
    expected.extend(unit);
    expected.extend(std::iter::repeat_n(0u8, UNIT as usize * CLUSTER));
    expected
}

fn build(volume: Arc<dyn VolumeReader>) -> Result<RangeReader> {
    RangeReaderBuilder::new(config()).volume(volume).build(&runs())
}

#[test]
fn reads_direct_compressed_and_sparse_spans() -> Result<()> {
    let reader = build(Arc::new(volume_image()))?;
    assert_eq!(
        reader.runs(),
        &[
            MappedReader::direct(0, 2, 4, 16),
            MappedReader::compressed(4, 6, 4, 1, 16),
            MappedReader::sparse(8, 4, 16),
        ]
    );

    let data = reader.read_range(0, usize::MAX)?;
    assert_eq!(data, expected_attribute());
    Ok(())
}

#[test]
fn reads_across_span_boundaries() -> Result<()> {
    let reader = build(Arc::new(volume_image()))?;
    let expected = expected_attribute();

    let mut buf = [0u8; 10];
    assert_eq!(reader.read_at(60, &mut buf)?, 10);
    assert_eq!(&buf, &expected[60..70]);

    assert_eq!(reader.read_at(120, &mut buf)?, 10);
    assert_eq!(&buf, &expected[120..130]);

    // Short read at the end of the attribute, then EOF.
    assert_eq!(reader.read_at(186, &mut buf)?, 6);
    assert_eq!(reader.read_at(192, &mut buf)?, 0);
    Ok(())
}

#[test]
fn parallel_read_matches_sequential() -> Result<()> {
    let reader = Arc::new(build(Arc::new(volume_image()))?);
    assert_eq!(reader.read_all()?, expected_attribute());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let reader = Arc::clone(&reader);
            std::thread::spawn(move || reader.read_range(i * 48, 48))
        })
        .collect();

    let expected = expected_attribute();
    for (i, handle) in handles.into_iter().enumerate() {
        let part = handle
            .join()
            .map_err(|_| std::io::Error::other("reader thread panicked"))??;
        assert_eq!(part, expected[i * 48..(i + 1) * 48]);
    }
    Ok(())
}

#[test]
fn memory_mapped_image() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&volume_image())?;
    file.flush()?;

    let volume = MmapVolume::open(file.path())?;
    assert_eq!(volume.len(), 8 * CLUSTER as u64);

    let reader = build(Arc::new(volume))?;
    assert_eq!(reader.read_all()?, expected_attribute());
    Ok(())
}

#[test]
fn truncated_volume_is_io_error() -> Result<()> {
    let mut image = volume_image();
    image.truncate(4 * CLUSTER);
    let reader = build(Arc::new(image))?;

    let mut buf = [0u8; 64];
    assert!(matches!(reader.read_at(0, &mut buf), Err(MapError::Io(_))));

    // Sparse spans never touch the volume.
    assert_eq!(reader.read_at(128, &mut buf)?, 64);
    assert!(buf.iter().all(|&b| b == 0));
    Ok(())
}

#[derive(Debug)]
struct ShortCodec;

impl Decompressor for ShortCodec {
    fn name(&self) -> &'static str {
        "short"
    }

    fn decompress(&self, compressed: &[u8], _unit_len: usize) -> Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

#[test]
fn decompressor_must_fill_the_unit() -> Result<()> {
    let reader = RangeReaderBuilder::new(config())
        .volume(Arc::new(volume_image()))
        .decompressor(Arc::new(ShortCodec))
        .build(&runs())?;

    let mut buf = [0u8; 8];
    assert!(matches!(
        reader.read_at(64, &mut buf),
        Err(MapError::Decompression(_))
    ));

    // Direct spans are unaffected by the codec.
    assert_eq!(reader.read_at(0, &mut buf)?, 8);
    assert_eq!(buf, [2u8; 8]);
    Ok(())
}

#[test]
fn composite_reads_delegate_and_zero_fill() -> Result<()> {
    let volume: Arc<dyn VolumeReader> = Arc::new(volume_image());
    let nested = RangeReader::from_nodes(
        vec![
            MappedReader::direct(1, 3, 1, 16),
            // Extends past the parent span; only its first cluster is visible.
            MappedReader::direct(3, 4, 2, 16),
        ],
        Some(Arc::clone(&volume)),
    )?;
    let reader = RangeReader::from_nodes(
        vec![
            MappedReader::direct(0, 2, 1, 16),
            MappedReader::composite(1, 4, 16, nested),
        ],
        Some(volume),
    )?;

    let data = reader.read_all()?;
    let mut expected = vec![2u8; 16];
    expected.extend([0u8; 16]);
    expected.extend([3u8; 16]);
    expected.extend([0u8; 16]);
    expected.extend([4u8; 16]);
    assert_eq!(data, expected);
    assert_eq!(reader.read_range(40, 30)?, expected[40..70]);
    Ok(())
}
