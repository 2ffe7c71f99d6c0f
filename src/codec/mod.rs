//! Row-at-a-time image codec interface.
//!
//! The cache engine never holds a full decoded image in memory. Decoding
//! pulls one row at a time straight into the mapped cache file, and tile
//! output pushes one row at a time into an encoder, so peak extra memory
//! is a single row on either side.
//!
//! - [`RowDecoder`]: source side, produces `height` rows of `row_bytes` each
//! - [`RowEncoder`]: output side, consumes the rows of one tile
//! - [`png`]: PNG implementation of both sides

pub mod png;

use crate::cache::CacheHeader;
use crate::error::Error;

pub use self::png::{PngSource, PngTileEncoder, TileBuffer};

/// Source of decoded pixel rows.
///
/// Rows are produced top to bottom, non-interlaced, in the pixel encoding
/// described by [`RowDecoder::header`].
pub trait RowDecoder {
    /// Geometry and pixel format of the rows this decoder produces.
    fn header(&self) -> &CacheHeader;

    /// Decode the next row into `row`.
    ///
    /// `row` is exactly `header().row_bytes` long. Called `header().height`
    /// times in total.
    fn decode_row(&mut self, row: &mut [u8]) -> Result<(), Error>;
}

/// Sink for the rows of one output tile.
pub trait RowEncoder {
    /// Encode one output row of `tile width * col_bytes` bytes.
    fn encode_row(&mut self, row: &[u8]) -> Result<(), Error>;

    /// Finish the output after the last row.
    fn flush(&mut self) -> Result<(), Error>;
}

impl<D: RowDecoder + ?Sized> RowDecoder for &mut D {
    fn header(&self) -> &CacheHeader {
        (**self).header()
    }

    fn decode_row(&mut self, row: &mut [u8]) -> Result<(), Error> {
        (**self).decode_row(row)
    }
}

impl<E: RowEncoder + ?Sized> RowEncoder for &mut E {
    fn encode_row(&mut self, row: &[u8]) -> Result<(), Error> {
        (**self).encode_row(row)
    }

    fn flush(&mut self) -> Result<(), Error> {
        (**self).flush()
    }
}
