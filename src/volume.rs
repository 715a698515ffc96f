//! Backing byte sources for read dispatch.
//!
//! A [`VolumeReader`] supplies raw bytes at a physical byte offset. Reads take
//! `&self` and carry no cursor, so a single volume can serve many concurrent
//! readers.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::Result;

/// Offset-addressed access to a volume or image.
pub trait VolumeReader: Send + Sync + fmt::Debug {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read. `0` means `offset` is at or past the
    /// end of the volume.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Fills `buf` completely from `offset`.
    ///
    /// # Errors
    /// Returns an `UnexpectedEof` I/O error if the volume ends first.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.read_at(offset, buf)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("volume ended at offset {offset} with {} bytes outstanding", buf.len()),
                )
                .into());
            }
            offset += n as u64;
            buf = &mut buf[n..];
        }
        Ok(())
    }
}

/// Produces zeros for any offset, without end.
///
/// Backs pure-sparse spans so they never touch the real volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReader;

impl VolumeReader for NullReader {
    fn read_at(&self, _offset: u64, buf: &mut [u8]) -> Result<usize> {
        buf.fill(0);
        Ok(buf.len())
    }
}

fn read_from_slice(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    let Some(available) = data.get(start..) else {
        return 0;
    };
    let n = available.len().min(buf.len());
    buf[..n].copy_from_slice(&available[..n]);
    n
}

impl VolumeReader for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        Ok(read_from_slice(self, offset, buf))
    }
}

impl VolumeReader for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        Ok(read_from_slice(self, offset, buf))
    }
}

impl<T: VolumeReader + ?Sized> VolumeReader for Arc<T> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf)
    }
}

/// A disk image opened through a read-only memory map.
#[derive(Debug)]
pub struct MmapVolume {
    mmap: Mmap,
}

impl MmapVolume {
    /// Memory-maps the image at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;

        // Safety: external processes could modify the file while it is mapped.
        // Images are expected to be opened for exclusive forensic reading.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self { mmap })
    }

    /// Size of the image in bytes.
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Returns true if the image is empty.
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl VolumeReader for MmapVolume {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        Ok(read_from_slice(&self.mmap, offset, buf))
    }
}
