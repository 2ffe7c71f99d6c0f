//! Cache handle.
//!
//! A [`CacheHandle`] binds a source image, its cache file and an access mode,
//! and walks them through the cache lifecycle:
//!
//! ```text
//!            open / first tile
//! Unopened ─────────────────────▶ Mapped ──close──▶ Closed
//!    │                              ▲
//!    └──────── update ──────────────┘
//! ```
//!
//! Creation goes through [`create_and_publish`], reading through
//! [`MappedCache`]. Either way the handle ends up owning one read-only
//! mapping, released on [`close`](CacheHandle::close) or drop.

use std::fmt;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::cache::{
    check_status, create_and_publish, CacheHeader, CacheStatus, MappedCache, NoLock, WriterLock,
};
use crate::codec::{PngSource, PngTileEncoder, RowDecoder, RowEncoder, TileBuffer};
use crate::error::Error;
use crate::path::{cache_path_for, is_cache_path};
use crate::tile::{extract_tile, TileFormat, TileRequest};

/// Access mode of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Open and tile existing caches only
    Read,
    /// May also create or replace the cache
    Update,
}

/// Summary of an image and its cache.
///
/// Modification times are whole seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub image_width: u32,
    pub image_height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub col_bytes: u8,
    pub image_modified: Option<u64>,
    pub image_bytes: u64,
    pub cache_modified: Option<u64>,
    pub cache_bytes: u64,
}

enum State {
    Unopened,
    Mapped(MappedCache),
    Closed,
}

// =============================================================================
// Cache Handle
// =============================================================================

/// A source image bound to its cache file.
pub struct CacheHandle {
    source_path: PathBuf,
    cache_path: PathBuf,
    mode: OpenMode,
    lock: Arc<dyn WriterLock>,
    state: State,
}

impl CacheHandle {
    /// Create a handle for `source`, caching next to it.
    ///
    /// A `.cache` path is taken as a cache image: it is its own source and
    /// can be opened and tiled but not updated.
    pub fn new(source: impl AsRef<Path>, mode: OpenMode) -> Result<Self, Error> {
        let source_path = source.as_ref().to_path_buf();
        let cache_path = if is_cache_path(&source_path) {
            source_path.clone()
        } else {
            cache_path_for(&source_path)?
        };

        Ok(Self::with_cache_path(source_path, cache_path, mode))
    }

    /// Create a handle with an explicit cache path.
    pub fn with_cache_path(
        source: impl Into<PathBuf>,
        cache: impl Into<PathBuf>,
        mode: OpenMode,
    ) -> Self {
        Self {
            source_path: source.into(),
            cache_path: cache.into(),
            mode,
            lock: Arc::new(NoLock),
            state: State::Unopened,
        }
    }

    /// Use `lock` to serialize cache creation.
    pub fn with_lock(mut self, lock: Arc<dyn WriterLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether the handle was created directly on a cache file.
    pub fn is_cache_image(&self) -> bool {
        self.source_path == self.cache_path
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.state, State::Mapped(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Freshness of the cache file relative to the source image.
    pub fn status(&self) -> Result<CacheStatus, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        check_status(&self.source_path, &self.cache_path)
    }

    /// Decode the source PNG and publish a new cache.
    pub fn update(&mut self) -> Result<(), Error> {
        self.check_writable()?;
        let mut source = PngSource::open(&self.source_path)?;
        self.update_from(&mut source)
    }

    /// Publish a new cache from an arbitrary row decoder.
    ///
    /// Any mapping the handle holds is dropped first. On success the handle
    /// is left mapped on the new cache.
    pub fn update_from<D: RowDecoder + ?Sized>(&mut self, decoder: &mut D) -> Result<(), Error> {
        self.check_writable()?;
        self.state = State::Unopened;

        debug!(cache = %self.cache_path.display(), "Updating cache");
        let cache = create_and_publish(&self.cache_path, decoder, self.lock.as_ref())?;
        self.state = State::Mapped(cache);
        Ok(())
    }

    /// Map the existing cache. Does nothing if already mapped.
    pub fn open(&mut self) -> Result<(), Error> {
        self.mapped().map(|_| ())
    }

    /// Bring the cache up to date if allowed, then map it.
    ///
    /// In [`OpenMode::Update`] a stale or absent cache (or any cache when
    /// `force` is set) is re-created; otherwise the existing cache is opened.
    /// Returns the status observed before any update.
    pub fn open_or_update(&mut self, force: bool) -> Result<CacheStatus, Error> {
        let status = self.status()?;

        let writable = self.mode == OpenMode::Update && !self.is_cache_image();
        if writable && (force || status.needs_update()) {
            self.update()?;
        } else {
            self.open()?;
        }

        Ok(status)
    }

    /// Release the mapping. Later operations fail with [`Error::Closed`].
    pub fn close(&mut self) {
        if !self.is_closed() {
            debug!(cache = %self.cache_path.display(), "Closing cache handle");
        }
        self.state = State::Closed;
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Header of the cache, mapping it if needed.
    pub fn header(&mut self) -> Result<&CacheHeader, Error> {
        Ok(self.mapped()?.header())
    }

    /// Dimensions, format and file statistics of the image and its cache.
    pub fn info(&mut self) -> Result<ImageInfo, Error> {
        let image = fs::metadata(&self.source_path).map_err(|e| Error::ImageStat {
            path: self.source_path.clone(),
            source: e,
        })?;

        let cache = self.mapped()?;
        let meta = cache.metadata()?;
        let header = cache.header();

        Ok(ImageInfo {
            image_width: header.width,
            image_height: header.height,
            bit_depth: header.bit_depth,
            color_type: header.color_type,
            col_bytes: header.col_bytes,
            image_modified: modified_secs(&image),
            image_bytes: image.len(),
            cache_modified: modified_secs(&meta),
            cache_bytes: meta.len(),
        })
    }

    /// Feed the rows of `request` to `encoder`, mapping the cache if needed.
    pub fn tile<E: RowEncoder + ?Sized>(
        &mut self,
        request: &TileRequest,
        encoder: &mut E,
    ) -> Result<(), Error> {
        let cache = self.mapped()?;
        extract_tile(&cache.pixels(), request, encoder)
    }

    /// Output format of `request`, after validating it.
    pub fn tile_format(&mut self, request: &TileRequest) -> Result<TileFormat, Error> {
        let header = self.header()?;
        request.validate(header)?;
        Ok(TileFormat::for_request(header, request))
    }

    /// Render `request` as a PNG.
    pub fn tile_png(&mut self, request: &TileRequest) -> Result<Bytes, Error> {
        let format = self.tile_format(request)?;

        let buffer = TileBuffer::new();
        let mut encoder = PngTileEncoder::begin(buffer.clone(), &format)?;
        self.tile(request, &mut encoder)?;
        drop(encoder);

        Ok(buffer.take())
    }

    fn mapped(&mut self) -> Result<&MappedCache, Error> {
        if let State::Unopened = self.state {
            let cache = MappedCache::open(&self.cache_path)?;
            self.state = State::Mapped(cache);
        }

        match &self.state {
            State::Mapped(cache) => Ok(cache),
            _ => Err(Error::Closed),
        }
    }

    fn check_writable(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if self.mode == OpenMode::Read {
            return Err(Error::ReadOnly {
                path: self.cache_path.clone(),
            });
        }
        if self.is_cache_image() {
            return Err(Error::CachedImage {
                path: self.cache_path.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Unopened => "unopened",
            State::Mapped(_) => "mapped",
            State::Closed => "closed",
        };
        f.debug_struct("CacheHandle")
            .field("source_path", &self.source_path)
            .field("cache_path", &self.cache_path)
            .field("mode", &self.mode)
            .field("state", &state)
            .finish()
    }
}

fn modified_secs(meta: &Metadata) -> Option<u64> {
    let modified = meta.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_secs())
}

// =============================================================================
// Tests
// =============================================================================
