//! Atomic cache creation.
//!
//! A new cache is written to a `.tmp` sibling of the cache path, mapped
//! read-write and filled row by row straight from the decoder. Only once
//! every row is in place is the temp file renamed over the cache path.
//! Rename is atomic, so a reader opening the cache path sees either the
//! previous complete cache or the new complete one, never a partial file.
//!
//! The temp file is held under an exclusive, non-blocking `flock` for as long
//! as its writer has it open. A second writer for the same cache fails with
//! [`CacheOp::OpenTmp`] instead of sharing the file, so a published cache is
//! never written through another writer's mapping.
//!
//! On failure the mapping and descriptor are released, the cache path is
//! left untouched and the temp file stays on disk; the next create reuses
//! and resizes it.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};
use tracing::{debug, warn};

use crate::codec::RowDecoder;
use crate::error::{CacheOp, Error};
use crate::path::temp_path_for;

use super::header::{CacheHeader, HEADER_SIZE};
use super::lock::WriterLock;
use super::mapped::MappedCache;

/// How often a temp file replaced between open and lock is reopened.
const TEMP_OPEN_ATTEMPTS: usize = 8;

/// Create the cache at `cache_path` from `decoder` and publish it.
///
/// Returns the freshly published cache, already mapped read-only.
pub fn create_and_publish<D: RowDecoder + ?Sized>(
    cache_path: &Path,
    decoder: &mut D,
    lock: &dyn WriterLock,
) -> Result<MappedCache, Error> {
    let header = decoder.header().clone();
    header
        .check()
        .map_err(|reason| Error::ImageFormat { reason })?;

    debug!(
        width = header.width,
        height = header.height,
        bit_depth = header.bit_depth,
        color_type = header.color_type,
        row_bytes = header.row_bytes,
        col_bytes = header.col_bytes,
        num_palette = header.num_palette,
        "Creating cache"
    );

    let temp_path = temp_path_for(cache_path)?;
    let _guard = lock.acquire(cache_path)?;

    let mut temp = TempCache::create(&temp_path, header)?;
    temp.fill(decoder).map_err(|e| left_behind(&temp_path, e))?;

    temp.publish(cache_path)
}

/// Log that a failed create left its temp file on disk.
fn left_behind(temp_path: &Path, e: Error) -> Error {
    warn!(path = %temp_path.display(), "Cache create failed, temp file left behind: {}", e);
    e
}

// =============================================================================
// TempCache
// =============================================================================

/// A temp cache file mapped read-write while it is being filled.
struct TempCache {
    // Dropped before the file, which holds the flock.
    map: MmapMut,
    file: File,
    header: CacheHeader,
    path: PathBuf,
}

impl TempCache {
    /// Open and lock `path`, grow it to its final size, map it and write the
    /// header.
    fn create(path: &Path, header: CacheHeader) -> Result<Self, Error> {
        let total = header.total_size();
        let len = usize::try_from(total).map_err(|_| Error::ImageFormat {
            reason: format!("{} bytes cannot be mapped on this platform", total),
        })?;

        let file = open_exclusive(path)?;

        file.set_len(total)
            .map_err(|e| left_behind(path, Error::cache_io(CacheOp::Truncate, path, e)))?;

        // SAFETY: this writer holds the exclusive lock on the temp file, which
        // is not yet visible at the cache path, and the mapping length equals
        // the length just set.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(|e| left_behind(path, Error::cache_io(CacheOp::Map, path, e)))?;

        header.write_to(&mut map[..HEADER_SIZE]);

        Ok(Self {
            map,
            file,
            header,
            path: path.to_path_buf(),
        })
    }

    /// Decode every row directly into its place in the mapping.
    fn fill<D: RowDecoder + ?Sized>(&mut self, decoder: &mut D) -> Result<(), Error> {
        let row_bytes = self.header.row_bytes as usize;
        let data = &mut self.map[HEADER_SIZE..];

        for row in 0..self.header.height as usize {
            let start = row * row_bytes;
            decoder.decode_row(&mut data[start..start + row_bytes])?;
        }

        Ok(())
    }

    /// Flush the mapping, rename over `cache_path` and keep the mapping
    /// as a read-only view of the published cache.
    fn publish(self, cache_path: &Path) -> Result<MappedCache, Error> {
        let TempCache {
            map,
            file,
            header,
            path,
        } = self;

        map.flush()
            .map_err(|e| left_behind(&path, Error::cache_io(CacheOp::Write, &path, e)))?;

        fs::rename(&path, cache_path)
            .map_err(|e| left_behind(&path, Error::cache_io(CacheOp::RenameTmp, &path, e)))?;

        debug!(
            from = %path.display(),
            to = %cache_path.display(),
            bytes = map.len(),
            "Published cache"
        );

        into_published(map.make_read_only(), file, header, cache_path)
    }
}

/// Wrap the remapped view of a just-published cache. If the mapping could
/// not be made read-only, the cache is already in place and is reopened.
fn into_published(
    remapped: io::Result<Mmap>,
    file: File,
    header: CacheHeader,
    cache_path: &Path,
) -> Result<MappedCache, Error> {
    match remapped {
        Ok(map) => Ok(MappedCache::from_parts(
            map,
            file,
            header,
            cache_path.to_path_buf(),
        )),
        Err(e) => {
            warn!(
                path = %cache_path.display(),
                "Read-only remap of published cache failed, reopening: {}", e
            );
            drop(file);
            MappedCache::open(cache_path)
        }
    }
}

// =============================================================================
// Temp File Exclusion
// =============================================================================

/// Open (creating if needed) and exclusively lock the temp file at `path`.
///
/// A file renamed away between open and lock is a published cache; it is
/// released and `path` is opened again.
fn open_exclusive(path: &Path) -> Result<File, Error> {
    for _ in 0..TEMP_OPEN_ATTEMPTS {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::cache_io(CacheOp::OpenTmp, path, e))?;

        try_lock_exclusive(&file).map_err(|e| Error::cache_io(CacheOp::OpenTmp, path, e))?;

        let linked = is_linked_at(&file, path)
            .map_err(|e| Error::cache_io(CacheOp::Stat, path, e))?;
        if linked {
            return Ok(file);
        }

        debug!(path = %path.display(), "Temp file replaced while locking, reopening");
    }

    Err(Error::cache_io(
        CacheOp::OpenTmp,
        path,
        io::Error::new(io::ErrorKind::WouldBlock, "temp file keeps being replaced"),
    ))
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and open for this call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Whether `path` still names the open `file`.
#[cfg(unix)]
fn is_linked_at(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let open = file.metadata()?;
    match fs::metadata(path) {
        Ok(linked) => Ok(open.dev() == linked.dev() && open.ino() == linked.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_linked_at(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

// =============================================================================
// Tests
// =============================================================================
