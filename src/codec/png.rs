//! PNG codec.
//!
//! # Design Decisions
//!
//! - **No transformations**: rows are decoded with
//!   [`png::Transformations::IDENTITY`], so the cache holds the image's native
//!   samples (16-bit samples stay big-endian) and palette images stay indexed.
//!
//! - **One sample per byte**: 1, 2 and 4-bit samples are unpacked to one byte
//!   each on decode and packed again on encode. Every pixel then starts on a
//!   byte boundary and tiles can begin at any column.
//!
//! - **Non-interlaced only**: interlaced images cannot be streamed a row at a
//!   time and are rejected when opened.

use std::cell::RefCell;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bytes::{Bytes, BytesMut};

use png::{BitDepth, ColorType, Decoder, DecodingError, Encoder, Reader, StreamWriter, Transformations};

use crate::cache::{CacheHeader, PaletteEntry};
use crate::error::Error;
use crate::tile::TileFormat;

use super::{RowDecoder, RowEncoder};

// =============================================================================
// Decoder
// =============================================================================

/// Streaming PNG decoder producing one unpacked row per call.
pub struct PngSource {
    reader: Reader<BufReader<File>>,
    header: CacheHeader,
    path: PathBuf,
    rows_read: u32,
}

impl PngSource {
    /// Open a PNG file and read its header chunks.
    ///
    /// # Errors
    ///
    /// - [`Error::ImageOpen`] if the file cannot be opened or read
    /// - [`Error::ImageFormat`] if it is not a PNG this codec handles
    /// - [`Error::Interlaced`] for interlaced images
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| Error::ImageOpen {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut decoder = Decoder::new(BufReader::new(file));
        decoder.set_transformations(Transformations::IDENTITY);

        let reader = decoder.read_info().map_err(|e| match e {
            DecodingError::IoError(source) => Error::ImageOpen {
                path: path.to_path_buf(),
                source,
            },
            DecodingError::Format(reason) => Error::ImageFormat {
                reason: reason.to_string(),
            },
            other => Error::CodecCreate {
                message: other.to_string(),
            },
        })?;

        let info = reader.info();
        if info.interlaced {
            return Err(Error::Interlaced {
                path: path.to_path_buf(),
            });
        }
        let header = header_from_info(info)?;

        Ok(Self {
            reader,
            header,
            path: path.to_path_buf(),
            rows_read: 0,
        })
    }

    /// Path of the image being decoded.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowDecoder for PngSource {
    fn header(&self) -> &CacheHeader {
        &self.header
    }

    fn decode_row(&mut self, out: &mut [u8]) -> Result<(), Error> {
        let bit_depth = self.header.bit_depth;
        let height = self.header.height;
        let rows_read = self.rows_read;

        let row = self
            .reader
            .next_row()
            .map_err(codec_error)?
            .ok_or_else(|| Error::Codec {
                message: format!("image data ends after {} of {} rows", rows_read, height),
            })?;
        let data = row.data();

        if bit_depth < 8 {
            unpack_samples(data, bit_depth, out)?;
        } else if data.len() == out.len() {
            out.copy_from_slice(data);
        } else {
            return Err(Error::Codec {
                message: format!(
                    "row {} is {} bytes, expected {}",
                    rows_read,
                    data.len(),
                    out.len()
                ),
            });
        }

        self.rows_read += 1;
        Ok(())
    }
}

/// Build the cache header for a PNG, with sub-byte samples unpacked.
fn header_from_info(info: &png::Info<'_>) -> Result<CacheHeader, Error> {
    let channels = info.color_type.samples();
    let bytes_per_sample = if info.bit_depth == BitDepth::Sixteen { 2 } else { 1 };
    let col_bytes = channels * bytes_per_sample;

    let row_bytes = u32::try_from(info.width as u64 * col_bytes as u64).map_err(|_| {
        Error::ImageFormat {
            reason: format!("image width {} is too large", info.width),
        }
    })?;

    let header = CacheHeader::new(
        info.width,
        info.height,
        info.bit_depth as u8,
        info.color_type as u8,
        row_bytes,
        col_bytes as u8,
    );

    if info.color_type != ColorType::Indexed {
        return Ok(header);
    }

    let palette = info.palette.as_ref().ok_or_else(|| Error::ImageFormat {
        reason: "palette image without PLTE chunk".to_string(),
    })?;
    let entries: Vec<PaletteEntry> = palette
        .chunks_exact(3)
        .map(|rgb| PaletteEntry::new(rgb[0], rgb[1], rgb[2]))
        .collect();

    header.with_palette(&entries)
}

// =============================================================================
// Encoder
// =============================================================================

/// Streaming PNG encoder for one tile.
///
/// The png stream writer owns its sink, so `W` cannot borrow. Use a
/// [`TileBuffer`] to collect the encoded bytes in memory.
pub struct PngTileEncoder<W: Write + 'static> {
    stream: Option<StreamWriter<'static, W>>,
    bit_depth: u8,
    packed: Vec<u8>,
}

impl<W: Write + 'static> PngTileEncoder<W> {
    /// Write the PNG header chunks for `format` and prepare for rows.
    pub fn begin(writer: W, format: &TileFormat) -> Result<Self, Error> {
        let color = ColorType::from_u8(format.color_type).ok_or_else(|| Error::CodecCreate {
            message: format!("unknown color type {}", format.color_type),
        })?;
        let depth = BitDepth::from_u8(format.bit_depth).ok_or_else(|| Error::CodecCreate {
            message: format!("unknown bit depth {}", format.bit_depth),
        })?;

        let mut encoder = Encoder::new(writer, format.width, format.height);
        encoder.set_color(color);
        encoder.set_depth(depth);

        if let Some(palette) = &format.palette {
            let plte: Vec<u8> = palette
                .iter()
                .flat_map(|entry| [entry.red, entry.green, entry.blue])
                .collect();
            encoder.set_palette(plte);
        }

        let stream = encoder
            .write_header()
            .and_then(|writer| writer.into_stream_writer())
            .map_err(|e| Error::CodecCreate {
                message: e.to_string(),
            })?;

        Ok(Self {
            stream: Some(stream),
            bit_depth: format.bit_depth,
            packed: Vec::new(),
        })
    }
}

impl<W: Write + 'static> RowEncoder for PngTileEncoder<W> {
    fn encode_row(&mut self, row: &[u8]) -> Result<(), Error> {
        let stream = self.stream.as_mut().ok_or_else(|| Error::Codec {
            message: "row written after flush".to_string(),
        })?;

        let result = if self.bit_depth < 8 {
            pack_samples(row, self.bit_depth, &mut self.packed);
            stream.write_all(&self.packed)
        } else {
            stream.write_all(row)
        };

        result.map_err(codec_error)
    }

    fn flush(&mut self) -> Result<(), Error> {
        match self.stream.take() {
            Some(stream) => stream.finish().map_err(codec_error),
            None => Ok(()),
        }
    }
}

/// Shared in-memory sink for an encoded tile.
///
/// Clones write into the same buffer: hand one clone to the encoder and
/// [`take`](Self::take) the bytes from another once it is flushed.
#[derive(Debug, Clone, Default)]
pub struct TileBuffer {
    inner: Rc<RefCell<BytesMut>>,
}

impl TileBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything written so far.
    pub fn take(&self) -> Bytes {
        self.inner.borrow_mut().split().freeze()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Write for TileBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Sample Packing
// =============================================================================

/// Unpack `out.len()` samples of `bit_depth` bits (1, 2 or 4) from `packed`,
/// most significant bits first.
pub fn unpack_samples(packed: &[u8], bit_depth: u8, out: &mut [u8]) -> Result<(), Error> {
    let per_byte = (8 / bit_depth) as usize;
    let mask = ((1u16 << bit_depth) - 1) as u8;
    let needed = out.len().div_ceil(per_byte);

    if packed.len() < needed {
        return Err(Error::Codec {
            message: format!(
                "packed row is {} bytes, {} samples of {} bits need {}",
                packed.len(),
                out.len(),
                bit_depth,
                needed
            ),
        });
    }

    for (i, sample) in out.iter_mut().enumerate() {
        let shift = 8 - bit_depth as usize * (i % per_byte + 1);
        *sample = (packed[i / per_byte] >> shift) & mask;
    }

    Ok(())
}

/// Pack one-byte `samples` into `bit_depth` bits each (1, 2 or 4), most
/// significant bits first, replacing the contents of `out`.
pub fn pack_samples(samples: &[u8], bit_depth: u8, out: &mut Vec<u8>) {
    let per_byte = (8 / bit_depth) as usize;
    let mask = ((1u16 << bit_depth) - 1) as u8;

    out.clear();
    out.resize(samples.len().div_ceil(per_byte), 0);

    for (i, &sample) in samples.iter().enumerate() {
        let shift = 8 - bit_depth as usize * (i % per_byte + 1);
        out[i / per_byte] |= (sample & mask) << shift;
    }
}

fn codec_error(e: impl Display) -> Error {
    Error::Codec {
        message: e.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
