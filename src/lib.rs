//! # pngtile
//!
//! A decode-once tile cache for PNG images.
//!
//! The first time an image is requested it is decoded in full into an
//! uncompressed cache file next to it. Every later tile request maps that
//! file and copies rows straight out of the mapping, so serving a tile costs
//! only the tile's own bytes regardless of image size.
//!
//! ## Features
//!
//! - **Atomic publication**: caches are written to a `.tmp` file and renamed
//!   into place, so readers never see a partial cache
//! - **Freshness checks**: a cache older than its source is reported stale
//! - **Zero-copy tiles**: full-resolution tile rows are slices of the mapping
//! - **Palette pass-through**: indexed images keep their palette in tiles
//!
//! ## Architecture
//!
//! - [`cache`] - Cache file header, freshness, creation and mapping
//! - [`codec`] - Row-at-a-time decoder and encoder traits, PNG implementation
//! - [`tile`] - Tile requests and extraction from mapped pixels
//! - [`handle`] - Lifecycle façade tying source, cache and mode together
//! - [`path`] - Cache, temp and lock path derivation
//! - [`config`] - CLI configuration for the `pngtile` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use pngtile::{CacheHandle, OpenMode, TileRequest};
//!
//! # fn main() -> Result<(), pngtile::Error> {
//! let mut handle = CacheHandle::new("scan.png", OpenMode::Update)?;
//! handle.open_or_update(false)?;
//!
//! let tile = handle.tile_png(&TileRequest::new(0, 0, 256, 256))?;
//! std::fs::write("tile.png", &tile).ok();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod path;
pub mod tile;

// Re-export commonly used types
pub use cache::{
    check_status, create_and_publish, CacheHeader, CacheStatus, LockFile, MappedCache, NoLock,
    PaletteEntry, PixelData, WriterLock, HEADER_SIZE,
};
pub use codec::{PngSource, PngTileEncoder, RowDecoder, RowEncoder, TileBuffer};
pub use config::Config;
pub use error::{CacheOp, Error, ErrorKind};
pub use handle::{CacheHandle, ImageInfo, OpenMode};
pub use path::{cache_path_for, temp_path_for};
pub use tile::{extract_tile, TileFormat, TileRequest, MAX_ZOOM};
