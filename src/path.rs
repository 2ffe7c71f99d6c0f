//! Sibling path derivation for cache, temp and lock files.
//!
//! All derived paths replace the extension of the final path component.
//! Dots in directory names never count as an extension, so `a.d/image`
//! has no extension and cannot be cached.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Extension of committed cache files.
pub const CACHE_EXTENSION: &str = "cache";

/// Extension of cache files that are still being written.
pub const TEMP_EXTENSION: &str = "tmp";

/// Extension of writer lock files.
pub const LOCK_EXTENSION: &str = "lock";

/// Upper bound (exclusive) on the byte length of a derived path.
pub const MAX_PATH_LEN: usize = 1024;

/// Replace the extension of `path` with `extension`.
///
/// Fails with [`Error::InvalidPath`] if `path` has no extension or the
/// result would not fit in [`MAX_PATH_LEN`] bytes.
pub fn with_extension(path: &Path, extension: &str) -> Result<PathBuf, Error> {
    if path.extension().is_none() {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
        });
    }

    let derived = path.with_extension(extension);
    if derived.as_os_str().len() >= MAX_PATH_LEN {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
        });
    }

    Ok(derived)
}

/// Path of the cache file for a source image, e.g. `foo.png` -> `foo.cache`.
pub fn cache_path_for(source: &Path) -> Result<PathBuf, Error> {
    with_extension(source, CACHE_EXTENSION)
}

/// Path of the temp file used while creating `cache`, e.g. `foo.cache` -> `foo.tmp`.
pub fn temp_path_for(cache: &Path) -> Result<PathBuf, Error> {
    with_extension(cache, TEMP_EXTENSION)
}

/// Path of the writer lock file for `cache`, e.g. `foo.cache` -> `foo.lock`.
pub fn lock_path_for(cache: &Path) -> Result<PathBuf, Error> {
    with_extension(cache, LOCK_EXTENSION)
}

/// Whether `path` names a cache file rather than a source image.
pub fn is_cache_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == CACHE_EXTENSION)
        .unwrap_or(false)
}

// =============================================================================
// Tests
// =============================================================================
