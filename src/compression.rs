//! Pluggable decompression backend.
//!
//! A compressed span stores a compression unit in fewer real clusters than
//! its logical length. The [`Decompressor`] trait turns those real clusters
//! back into exactly one unit of logical bytes. [`Lznt1`] implements the codec
//! NTFS uses for compressed attributes.

use std::fmt;

use crate::error::{MapError, Result};

/// Logical size of one LZNT1 chunk.
const LZNT1_CHUNK_SIZE: usize = 4096;

/// Chunk header bit flagging a compressed chunk.
const LZNT1_COMPRESSED_FLAG: u16 = 0x8000;

/// Chunk header bits holding `chunk data size - 1`.
const LZNT1_SIZE_MASK: u16 = 0x0FFF;

/// Interface for compression-unit codecs.
pub trait Decompressor: Send + Sync + fmt::Debug {
    /// Human-readable codec name, used in reports and logs.
    fn name(&self) -> &'static str;

    /// Reconstructs one compression unit.
    ///
    /// `compressed` holds every real cluster of the unit. The returned buffer
    /// must be exactly `unit_len` bytes.
    ///
    /// # Errors
    /// Returns `MapError::Decompression` if the stream is malformed or decodes
    /// to more than `unit_len` bytes.
    fn decompress(&self, compressed: &[u8], unit_len: usize) -> Result<Vec<u8>>;
}

/// The LZNT1 codec.
///
/// The stream is a sequence of chunks, each holding up to 4 KiB of output.
/// Output shorter than the unit is zero padded, matching how NTFS leaves the
/// tail of a unit unwritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lznt1;

impl Decompressor for Lznt1 {
    fn name(&self) -> &'static str {
        "LZNT1"
    }

    fn decompress(&self, compressed: &[u8], unit_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(unit_len);
        let mut pos = 0;

        while let Some(header_bytes) = compressed.get(pos..pos + 2) {
            let header = u16::from_le_bytes([header_bytes[0], header_bytes[1]]);
            if header == 0 {
                break;
            }
            pos += 2;

            let size = usize::from(header & LZNT1_SIZE_MASK) + 1;
            let chunk = compressed.get(pos..pos + size).ok_or_else(|| {
                MapError::decompression(format!(
                    "chunk at byte {} claims {size} bytes, only {} remain",
                    pos - 2,
                    compressed.len() - pos
                ))
            })?;

            if header & LZNT1_COMPRESSED_FLAG != 0 {
                decompress_chunk(chunk, &mut out)?;
            } else {
                out.extend_from_slice(chunk);
            }
            pos += size;

            if out.len() > unit_len {
                return Err(MapError::decompression(format!(
                    "stream decodes past the {unit_len}-byte unit"
                )));
            }
        }

        out.resize(unit_len, 0);
        Ok(out)
    }
}

fn decompress_chunk(chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let start = out.len();
    let mut i = 0;

    while i < chunk.len() {
        let flags = chunk[i];
        i += 1;

        for bit in 0..8 {
            if i >= chunk.len() {
                break;
            }

            if flags & (1 << bit) == 0 {
                out.push(chunk[i]);
                i += 1;
                continue;
            }

            let pair = chunk
                .get(i..i + 2)
                .ok_or_else(|| MapError::decompression("back reference truncated"))?;
            let token = u16::from_le_bytes([pair[0], pair[1]]);
            i += 2;

            let decoded = out.len() - start;
            if decoded == 0 || decoded > LZNT1_CHUNK_SIZE {
                return Err(MapError::decompression(format!(
                    "back reference at chunk position {decoded}"
                )));
            }

            let (length_mask, displacement_shift) = token_split(decoded);
            let length = usize::from(token & length_mask) + 3;
            let displacement = usize::from(token >> displacement_shift) + 1;
            if displacement > decoded {
                return Err(MapError::decompression(format!(
                    "back reference of {displacement} bytes before chunk start (position {decoded})"
                )));
            }

            // Byte-wise copy; the source may overlap the bytes being written.
            for _ in 0..length {
                let b = out[out.len() - displacement];
                out.push(b);
            }
        }
    }
    Ok(())
}

/// Length mask and displacement shift for a token at `decoded` bytes into a chunk.
fn token_split(decoded: usize) -> (u16, u32) {
    let mut pos = decoded - 1;
    let mut length_mask: u16 = 0x0FFF;
    let mut displacement_shift = 12;
    while pos >= 0x10 {
        pos >>= 1;
        length_mask >>= 1;
        displacement_shift -= 1;
    }
    (length_mask, displacement_shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_chunk_is_copied_and_padded() -> Result<()> {
        // Uncompressed chunk: signature 0x3000, size 4.
        let stream = [0x03, 0x30, b'd', b'a', b't', b'a', 0x00, 0x00];
        let out = Lznt1.decompress(&stream, 8)?;
        assert_eq!(out, b"data\0\0\0\0");
        Ok(())
    }

    #[test]
    fn overlapping_back_reference() -> Result<()> {
        // "abc" then copy 6 bytes from 3 back.
        let stream = [0x05, 0xB0, 0x08, b'a', b'b', b'c', 0x03, 0x20];
        let out = Lznt1.decompress(&stream, 9)?;
        assert_eq!(out, b"abcabcabc");
        Ok(())
    }

    #[test]
    fn token_split_narrows_with_position() -> Result<()> {
        assert_eq!(token_split(1), (0x0FFF, 12));
        assert_eq!(token_split(16), (0x0FFF, 12));
        assert_eq!(token_split(17), (0x07FF, 11));
        assert_eq!(token_split(4096), (0x000F, 4));

        // 17 literals, then copy 5 bytes from 17 back: token (16 << 11) | 2.
        let mut stream = vec![0x15, 0xB0];
        stream.push(0x00);
        stream.extend_from_slice(b"01234567");
        stream.push(0x00);
        stream.extend_from_slice(b"89abcdef");
        stream.extend_from_slice(&[0x02, b'g', 0x02, 0x80]);

        let out = Lznt1.decompress(&stream, 22)?;
        assert_eq!(out, b"0123456789abcdefg01234");
        Ok(())
    }

    #[test]
    fn rejects_overrun() {
        let stream = [0x03, 0x30, b'd', b'a', b't', b'a'];
        assert!(matches!(
            Lznt1.decompress(&stream, 2),
            Err(MapError::Decompression(_))
        ));
    }

    #[test]
    fn rejects_truncated_chunk() {
        let stream = [0x0F, 0xB0, 0x00, b'a'];
        assert!(matches!(
            Lznt1.decompress(&stream, 4096),
            Err(MapError::Decompression(_))
        ));
    }

    #[test]
    fn rejects_reference_before_chunk_start() {
        // Token as the first element of a chunk has nothing to copy from.
        let stream = [0x02, 0xB0, 0x01, 0x00, 0x00];
        assert!(matches!(
            Lznt1.decompress(&stream, 4096),
            Err(MapError::Decompression(_))
        ));
    }
}
