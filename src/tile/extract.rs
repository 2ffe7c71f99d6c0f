//! Tile extraction from cached pixel data.
//!
//! At zoom 0 every output row is a slice of the mapping, handed to the
//! encoder without copying:
//!
//! ```text
//! row r of the tile = data[(y + r) * row_bytes + x * col_bytes ..][.. width * col_bytes]
//! ```
//!
//! At higher zoom levels every `2^zoom`-th pixel of every `2^zoom`-th row is
//! gathered into a single reusable row buffer.

use tracing::trace;

use crate::cache::PixelData;
use crate::codec::RowEncoder;
use crate::error::Error;

use super::request::TileRequest;

/// Validate `request` and feed its rows to `encoder`, then flush it.
pub fn extract_tile<E: RowEncoder + ?Sized>(
    pixels: &PixelData<'_>,
    request: &TileRequest,
    encoder: &mut E,
) -> Result<(), Error> {
    let header = pixels.header();
    request.validate(header)?;

    trace!(
        x = request.x,
        y = request.y,
        width = request.width,
        height = request.height,
        zoom = request.zoom,
        "Extracting tile"
    );

    if request.zoom == 0 {
        for row in request.y..request.y + request.height {
            encoder.encode_row(pixels.pixels(row, request.x, request.width)?)?;
        }
    } else {
        let step = 1u32 << request.zoom;
        let col_bytes = header.col_bytes as usize;
        let mut buf = vec![0u8; request.width as usize * col_bytes];

        for out_row in 0..request.height {
            let row = request.y + out_row * step;
            for (out_col, pixel) in buf.chunks_exact_mut(col_bytes).enumerate() {
                let col = request.x + out_col as u32 * step;
                pixel.copy_from_slice(pixels.pixel(row, col)?);
            }
            encoder.encode_row(&buf)?;
        }
    }

    encoder.flush()
}

// =============================================================================
// Tests
// =============================================================================
