//! Tile addressing.
//!
//! Maps a pixel rectangle of the source image onto byte ranges of the cached
//! pixel data and drives an encoder row by row.
//!
//! # Components
//!
//! - [`TileRequest`]: origin, size and zoom of a tile, with bounds validation
//! - [`TileFormat`]: output geometry and pixel format, palette included
//! - [`extract_tile`]: feeds the tile's rows to a [`RowEncoder`](crate::codec::RowEncoder)
//!
//! # Example
//!
//! ```
//! use pngtile::cache::{CacheHeader, PixelData};
//! use pngtile::tile::TileRequest;
//!
//! // 4x4 RGB image without row padding
//! let header = CacheHeader::new(4, 4, 8, 2, 12, 3);
//! let data = vec![0u8; 48];
//! let pixels = PixelData::new(&header, &data).unwrap();
//!
//! let request = TileRequest::new(1, 1, 2, 2);
//! assert!(request.validate(&header).is_ok());
//! assert_eq!(pixels.pixels(1, 1, 2).unwrap().len(), 6);
//! ```

mod extract;
mod request;

pub use extract::extract_tile;
pub use request::{TileFormat, TileRequest, DEFAULT_TILE_SIZE, MAX_ZOOM};
