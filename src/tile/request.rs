//! Tile requests and the output format they produce.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheHeader, PaletteEntry};
use crate::error::Error;

/// Default tile width and height in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Largest supported zoom level; each level halves the resolution.
pub const MAX_ZOOM: u8 = 8;

// =============================================================================
// Tile Request
// =============================================================================

/// A rectangular tile of the source image.
///
/// `x` and `y` are the top-left corner in source pixels. `width` and
/// `height` are the size of the output tile; at zoom `z` the tile covers
/// `width << z` by `height << z` source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRequest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub zoom: u8,
}

impl TileRequest {
    /// Create a request at full resolution.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            zoom: 0,
        }
    }

    /// A request covering the whole image at full resolution.
    pub fn full(header: &CacheHeader) -> Self {
        Self::new(0, 0, header.width, header.height)
    }

    /// Set the zoom level.
    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = zoom;
        self
    }

    /// Size of the covered source region in pixels.
    pub fn source_extent(&self) -> (u64, u64) {
        let zoom = self.zoom.min(MAX_ZOOM) as u32;
        (
            (self.width as u64) << zoom,
            (self.height as u64) << zoom,
        )
    }

    /// Check the request against an image.
    ///
    /// # Errors
    ///
    /// - [`Error::TileDim`] for a zero width or height
    /// - [`Error::TileZoom`] for a zoom above [`MAX_ZOOM`]
    /// - [`Error::TileClip`] if the covered region leaves the image
    pub fn validate(&self, header: &CacheHeader) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::TileDim {
                width: self.width,
                height: self.height,
            });
        }

        if self.zoom > MAX_ZOOM {
            return Err(Error::TileZoom {
                zoom: self.zoom,
                max: MAX_ZOOM,
            });
        }

        let (extent_x, extent_y) = self.source_extent();
        if self.x as u64 + extent_x > header.width as u64
            || self.y as u64 + extent_y > header.height as u64
        {
            return Err(Error::TileClip {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                zoom: self.zoom,
                image_width: header.width,
                image_height: header.height,
            });
        }

        Ok(())
    }
}

// =============================================================================
// Tile Format
// =============================================================================

/// Everything an encoder needs to begin a tile.
///
/// The pixel format is the cached one; the palette is passed through only
/// for palette images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFormat {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub palette: Option<Vec<PaletteEntry>>,
}

impl TileFormat {
    /// Output format for `request` against a cache with `header`.
    pub fn for_request(header: &CacheHeader, request: &TileRequest) -> Self {
        let palette = header
            .is_palette()
            .then(|| header.palette_entries().to_vec());

        Self {
            width: request.width,
            height: request.height,
            bit_depth: header.bit_depth,
            color_type: header.color_type,
            palette,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
