//! Memory-mapped or owned bytes backing a [`FileSource`](crate::store::FileSource).

use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use crate::error::Result;

/// Backing storage for a stored stream.
///
/// `Mmap` avoids copying large files into RAM;
/// `Owned` is used for `from_bytes()` and testing.
pub enum DataSource {
    /// File bytes owned in a `Vec<u8>`.
    Owned(Vec<u8>),
    /// Memory-mapped file.
    Mmap(memmap2::Mmap),
}

impl DataSource {
    /// Map a file read-only. Empty files are read as owned (mapping a
    /// zero-length file fails on some platforms).
    pub fn map(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(DataSource::Owned(Vec::new()));
        }
        // SAFETY: the mapping is read-only and the file is not modified by
        // this process while the source is open.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(DataSource::Mmap(mmap))
    }
}

impl Deref for DataSource {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            DataSource::Owned(v) => v,
            DataSource::Mmap(m) => m,
        }
    }
}

impl AsRef<[u8]> for DataSource {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}
