//! Cache file engine.
//!
//! A cache file is a fixed-size [`CacheHeader`] followed by the decoded,
//! uncompressed pixel rows of the source image.
//!
//! # Architecture
//!
//! ```text
//!  source.png ──RowDecoder──▶ publish ──rename──▶ source.cache
//!                               │                    │
//!                          source.tmp            MappedCache ──▶ PixelData
//!                       (mapped read-write)     (mapped read-only)
//! ```
//!
//! # Components
//!
//! - [`CacheHeader`]: header layout and codec
//! - [`check_status`]: freshness of a cache relative to its source
//! - [`create_and_publish`]: temp-file-then-rename creation
//! - [`MappedCache`]: owned mapping of a committed cache
//! - [`PixelData`]: bounds-checked pixel addressing
//! - [`WriterLock`]: hook for serializing concurrent writers

mod header;
mod lock;
mod mapped;
mod publish;
mod status;

pub use header::{CacheHeader, PaletteEntry, COLOR_TYPE_PALETTE, HEADER_SIZE, PALETTE_CAPACITY};
pub use lock::{LockFile, NoLock, WriterLock, WriterLockGuard, DEFAULT_LOCK_TIMEOUT};
pub use mapped::{read_header, MappedCache, PixelData};
pub use publish::create_and_publish;
pub use status::{check_status, CacheStatus};
