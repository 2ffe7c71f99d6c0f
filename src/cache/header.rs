//! Fixed-size cache header.
//!
//! The header is written verbatim at offset 0 of every cache file and is
//! immediately followed by `row_bytes * height` bytes of row-major pixel data.
//!
//! # Layout
//!
//! ```text
//! Offset  Size  Field
//!      0     4  width        (u32)
//!      4     4  height       (u32)
//!      8     1  bit_depth    (u8)
//!      9     1  color_type   (u8)
//!     10     2  num_palette  (u16)
//!     12     4  row_bytes    (u32)
//!     16     1  col_bytes    (u8)
//!     17   768  palette      (256 x RGB)
//!    785        pixel data
//! ```
//!
//! Multi-byte fields use host-native byte order and no byte-order marker is
//! stored, so cache files cannot be shared between architectures of
//! different endianness. There is no magic or version field either.

use crate::error::Error;

/// Maximum number of palette entries.
pub const PALETTE_CAPACITY: usize = 256;

/// Color type tag of palette images. All other tags are opaque to the cache.
pub const COLOR_TYPE_PALETTE: u8 = 3;

const PALETTE_OFFSET: usize = 17;

/// Size of the encoded header in bytes.
pub const HEADER_SIZE: usize = PALETTE_OFFSET + PALETTE_CAPACITY * 3;

// =============================================================================
// PaletteEntry
// =============================================================================

/// One RGB palette entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PaletteEntry {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl PaletteEntry {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

// =============================================================================
// CacheHeader
// =============================================================================

/// Pixel format and geometry of a cached image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeader {
    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Bits per sample, as reported by the codec
    pub bit_depth: u8,

    /// Codec color type tag
    pub color_type: u8,

    /// Number of meaningful entries in `palette`
    pub num_palette: u16,

    /// Stride in bytes between the starts of consecutive rows
    pub row_bytes: u32,

    /// Size in bytes of one pixel
    pub col_bytes: u8,

    /// Palette storage; only the first `num_palette` entries are meaningful
    pub palette: [PaletteEntry; PALETTE_CAPACITY],
}

impl CacheHeader {
    /// Create a header without a palette.
    pub fn new(
        width: u32,
        height: u32,
        bit_depth: u8,
        color_type: u8,
        row_bytes: u32,
        col_bytes: u8,
    ) -> Self {
        Self {
            width,
            height,
            bit_depth,
            color_type,
            num_palette: 0,
            row_bytes,
            col_bytes,
            palette: [PaletteEntry::default(); PALETTE_CAPACITY],
        }
    }

    /// Set the palette entries, replacing any previous ones.
    ///
    /// Entries beyond [`PALETTE_CAPACITY`] are rejected.
    pub fn with_palette(mut self, entries: &[PaletteEntry]) -> Result<Self, Error> {
        if entries.len() > PALETTE_CAPACITY {
            return Err(Error::ImageFormat {
                reason: format!(
                    "palette has {} entries, at most {} are supported",
                    entries.len(),
                    PALETTE_CAPACITY
                ),
            });
        }

        self.palette = [PaletteEntry::default(); PALETTE_CAPACITY];
        self.palette[..entries.len()].copy_from_slice(entries);
        self.num_palette = entries.len() as u16;
        Ok(self)
    }

    /// Whether the color type denotes a palette image.
    #[inline]
    pub fn is_palette(&self) -> bool {
        self.color_type == COLOR_TYPE_PALETTE
    }

    /// The meaningful palette entries.
    pub fn palette_entries(&self) -> &[PaletteEntry] {
        let count = (self.num_palette as usize).min(PALETTE_CAPACITY);
        &self.palette[..count]
    }

    /// Size in bytes of the pixel data region.
    #[inline]
    pub fn data_size(&self) -> u64 {
        self.row_bytes as u64 * self.height as u64
    }

    /// Total size in bytes of a cache file with this header.
    #[inline]
    pub fn total_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.data_size()
    }

    /// Check the structural invariants of the header.
    ///
    /// Returns a description of the first violated invariant.
    pub fn check(&self) -> Result<(), String> {
        if self.col_bytes == 0 {
            return Err("col_bytes is zero".to_string());
        }

        let min_row_bytes = self.width as u64 * self.col_bytes as u64;
        if (self.row_bytes as u64) < min_row_bytes {
            return Err(format!(
                "row_bytes {} is less than width {} x col_bytes {}",
                self.row_bytes, self.width, self.col_bytes
            ));
        }

        if self.num_palette as usize > PALETTE_CAPACITY {
            return Err(format!(
                "num_palette {} exceeds {}",
                self.num_palette, PALETTE_CAPACITY
            ));
        }

        Ok(())
    }

    /// Write the encoded header into the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than [`HEADER_SIZE`].
    pub fn write_to(&self, buf: &mut [u8]) {
        let buf = &mut buf[..HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.width.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.height.to_ne_bytes());
        buf[8] = self.bit_depth;
        buf[9] = self.color_type;
        buf[10..12].copy_from_slice(&self.num_palette.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.row_bytes.to_ne_bytes());
        buf[16] = self.col_bytes;

        for (entry, rgb) in self
            .palette
            .iter()
            .zip(buf[PALETTE_OFFSET..].chunks_exact_mut(3))
        {
            rgb[0] = entry.red;
            rgb[1] = entry.green;
            rgb[2] = entry.blue;
        }
    }

    /// Encode the header into a fresh buffer.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.write_to(&mut buf);
        buf
    }

    /// Decode a header from the start of `bytes`.
    ///
    /// Only the length is checked here; use [`CacheHeader::check`] for the
    /// structural invariants.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::CacheFormat {
                reason: format!(
                    "header needs {} bytes, got {}",
                    HEADER_SIZE,
                    bytes.len()
                ),
            });
        }

        let mut palette = [PaletteEntry::default(); PALETTE_CAPACITY];
        for (entry, rgb) in palette
            .iter_mut()
            .zip(bytes[PALETTE_OFFSET..HEADER_SIZE].chunks_exact(3))
        {
            *entry = PaletteEntry::new(rgb[0], rgb[1], rgb[2]);
        }

        Ok(Self {
            width: u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            height: u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            bit_depth: bytes[8],
            color_type: bytes[9],
            num_palette: u16::from_ne_bytes([bytes[10], bytes[11]]),
            row_bytes: u32::from_ne_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            col_bytes: bytes[16],
            palette,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
