//! Memory-mapped access to a committed cache file.
//!
//! [`MappedCache`] owns both the mapping and the file descriptor. Dropping it
//! unmaps and then closes, exactly once, on every path. Pixel access goes
//! through [`PixelData`], which checks row and column bounds before handing
//! out a slice of the mapping.

use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::error::{CacheOp, Error};

use super::header::{CacheHeader, HEADER_SIZE};

// =============================================================================
// MappedCache
// =============================================================================

/// An open, read-only mapping of a cache file.
pub struct MappedCache {
    // Field order matters: the mapping is dropped before the file.
    map: Mmap,
    file: File,
    header: CacheHeader,
    path: PathBuf,
}

impl MappedCache {
    /// Open the cache file at `path` and map it read-only.
    ///
    /// The header is read with plain reads, its invariants are checked, and
    /// the file length must equal the size the header implies before the
    /// file is mapped.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let mut file =
            File::open(path).map_err(|e| Error::cache_io(CacheOp::OpenRead, path, e))?;

        let header = read_header(&mut file, path)?;
        header
            .check()
            .map_err(|reason| Error::CacheFormat { reason })?;

        let file_len = file
            .metadata()
            .map_err(|e| Error::cache_io(CacheOp::Stat, path, e))?
            .len();
        let total = header.total_size();
        if file_len != total {
            return Err(Error::CacheFormat {
                reason: format!(
                    "file is {} bytes, header describes {} bytes",
                    file_len, total
                ),
            });
        }
        let len = usize::try_from(total).map_err(|_| Error::CacheFormat {
            reason: format!("{} bytes cannot be mapped on this platform", total),
        })?;

        // SAFETY: the mapping is read-only and its length matches the file
        // length checked above. A cache reaches its path only by rename once
        // its writer is done with it, and writers hold the temp file under an
        // exclusive lock, so the mapped inode is not written again.
        let map = unsafe { MmapOptions::new().len(len).map(&file) }
            .map_err(|e| Error::cache_io(CacheOp::Map, path, e))?;

        debug!(
            path = %path.display(),
            width = header.width,
            height = header.height,
            mapped = len,
            "Mapped cache"
        );

        Ok(Self::from_parts(map, file, header, path.to_path_buf()))
    }

    pub(crate) fn from_parts(map: Mmap, file: File, header: CacheHeader, path: PathBuf) -> Self {
        Self {
            map,
            file,
            header,
            path,
        }
    }

    /// The cache header.
    #[inline]
    pub fn header(&self) -> &CacheHeader {
        &self.header
    }

    /// Path the cache was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of mapped bytes (header plus pixel data).
    #[inline]
    pub fn mapped_len(&self) -> usize {
        self.map.len()
    }

    /// Metadata of the mapped file itself, which may differ from whatever
    /// currently sits at [`MappedCache::path`].
    pub fn metadata(&self) -> Result<Metadata, Error> {
        self.file
            .metadata()
            .map_err(|e| Error::cache_io(CacheOp::Stat, &self.path, e))
    }

    /// Raw pixel data region.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.map[HEADER_SIZE..]
    }

    /// Bounds-checked view of the pixel data.
    pub fn pixels(&self) -> PixelData<'_> {
        PixelData {
            header: &self.header,
            data: self.data(),
        }
    }
}

impl std::fmt::Debug for MappedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedCache")
            .field("path", &self.path)
            .field("width", &self.header.width)
            .field("height", &self.header.height)
            .field("mapped_len", &self.map.len())
            .finish()
    }
}

/// Read the header from the start of `reader`.
///
/// Short reads are resumed from the current offset; running out of data
/// before the header is complete is a format error.
pub fn read_header<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<CacheHeader, Error> {
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| Error::cache_io(CacheOp::Seek, path, e))?;

    let mut buf = [0u8; HEADER_SIZE];
    let mut filled = 0;

    while filled < HEADER_SIZE {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::CacheFormat {
                    reason: format!(
                        "file ends after {} of {} header bytes",
                        filled, HEADER_SIZE
                    ),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::cache_io(CacheOp::Read, path, e)),
        }
    }

    CacheHeader::decode(&buf)
}

// =============================================================================
// PixelData
// =============================================================================

/// Row-major pixel data addressed by pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct PixelData<'a> {
    header: &'a CacheHeader,
    data: &'a [u8],
}

impl<'a> PixelData<'a> {
    /// Wrap `data` laid out as described by `header`.
    ///
    /// Fails if the header is not self-consistent or `data` is shorter
    /// than `row_bytes * height`.
    pub fn new(header: &'a CacheHeader, data: &'a [u8]) -> Result<Self, Error> {
        header
            .check()
            .map_err(|reason| Error::CacheFormat { reason })?;
        if (data.len() as u64) < header.data_size() {
            return Err(Error::CacheFormat {
                reason: format!(
                    "pixel data is {} bytes, header describes {}",
                    data.len(),
                    header.data_size()
                ),
            });
        }
        Ok(Self { header, data })
    }

    #[inline]
    pub fn header(&self) -> &'a CacheHeader {
        self.header
    }

    /// `count` consecutive pixels of `row`, starting at column `col`.
    ///
    /// The slice starts at `row * row_bytes + col * col_bytes` and is
    /// `count * col_bytes` long.
    pub fn pixels(&self, row: u32, col: u32, count: u32) -> Result<&'a [u8], Error> {
        let header = self.header;
        let clip = || Error::TileClip {
            x: col,
            y: row,
            width: count,
            height: 1,
            zoom: 0,
            image_width: header.width,
            image_height: header.height,
        };

        if row >= header.height || col as u64 + count as u64 > header.width as u64 {
            return Err(clip());
        }

        let start = row as u64 * header.row_bytes as u64 + col as u64 * header.col_bytes as u64;
        let end = start + count as u64 * header.col_bytes as u64;
        if end > self.data.len() as u64 {
            return Err(clip());
        }

        Ok(&self.data[start as usize..end as usize])
    }

    /// The bytes of a single pixel.
    #[inline]
    pub fn pixel(&self, row: u32, col: u32) -> Result<&'a [u8], Error> {
        self.pixels(row, col, 1)
    }
}

// =============================================================================
// Tests
// =============================================================================
