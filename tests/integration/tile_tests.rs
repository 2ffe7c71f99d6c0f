//! Tile integration tests.
//!
//! Tests verify:
//! - Whole-image tiles reproduce the source pixels for every PNG format
//! - Palettes pass through to tile output unchanged
//! - Tile rows are addressed at the exact offsets of the mapping
//! - Zoomed tiles sample the expected source pixels

use png::{BitDepth, ColorType};

use pngtile::cache::NoLock;
use pngtile::{
    create_and_publish, extract_tile, CacheHandle, ErrorKind, MappedCache, OpenMode,
    PaletteEntry, TileRequest,
};

use super::test_utils::{decode_png, MarkerDecoder, PngFixture, RecordingEncoder};

// =============================================================================
// Round Trip
// =============================================================================

fn assert_round_trip(color: ColorType, depth: BitDepth, width: u32, height: u32) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("image.png");

    let fixture = PngFixture::patterned(width, height, color, depth);
    fixture.write(&source);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    handle.update().unwrap();

    let header = handle.header().unwrap().clone();
    assert_eq!((header.width, header.height), (width, height));
    assert_eq!(header.bit_depth, depth as u8);
    assert_eq!(header.color_type, color as u8);
    assert_eq!(header.row_bytes as usize, fixture.row_len());

    let tile = handle.tile_png(&TileRequest::full(&header)).unwrap();
    let decoded = decode_png(&tile);

    assert_eq!((decoded.width, decoded.height), (width, height));
    assert_eq!(decoded.color, color);
    assert_eq!(decoded.depth, depth);
    assert_eq!(decoded.palette, fixture.palette);
    assert_eq!(decoded.data, fixture.packed(), "{:?}/{:?}", color, depth);
}

#[test]
fn test_round_trip_eight_bit_formats() {
    assert_round_trip(ColorType::Grayscale, BitDepth::Eight, 9, 5);
    assert_round_trip(ColorType::GrayscaleAlpha, BitDepth::Eight, 4, 3);
    assert_round_trip(ColorType::Rgb, BitDepth::Eight, 7, 6);
    assert_round_trip(ColorType::Rgba, BitDepth::Eight, 5, 5);
}

#[test]
fn test_round_trip_sixteen_bit_formats() {
    assert_round_trip(ColorType::Grayscale, BitDepth::Sixteen, 3, 4);
    assert_round_trip(ColorType::Rgb, BitDepth::Sixteen, 2, 2);
    assert_round_trip(ColorType::Rgba, BitDepth::Sixteen, 5, 3);
}

#[test]
fn test_round_trip_sub_byte_formats() {
    assert_round_trip(ColorType::Grayscale, BitDepth::One, 11, 3);
    assert_round_trip(ColorType::Grayscale, BitDepth::Two, 5, 4);
    assert_round_trip(ColorType::Grayscale, BitDepth::Four, 3, 3);
}

#[test]
fn test_round_trip_palette_formats() {
    assert_round_trip(ColorType::Indexed, BitDepth::Eight, 6, 4);
    assert_round_trip(ColorType::Indexed, BitDepth::One, 9, 2);
    assert_round_trip(ColorType::Indexed, BitDepth::Four, 5, 5);
}

// =============================================================================
// Palette Pass-Through
// =============================================================================

#[test]
fn test_palette_passes_through_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("palette.png");

    let triples = vec![200, 10, 30, 0, 128, 255, 17, 34, 51];
    let fixture = PngFixture {
        width: 4,
        height: 2,
        color: ColorType::Indexed,
        depth: BitDepth::Eight,
        palette: Some(triples.clone()),
        samples: vec![0, 1, 2, 1, 2, 1, 0, 0],
    };
    fixture.write(&source);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    handle.update().unwrap();

    let header = handle.header().unwrap();
    assert_eq!(header.num_palette, 3);
    assert_eq!(
        header.palette_entries(),
        &[
            PaletteEntry::new(200, 10, 30),
            PaletteEntry::new(0, 128, 255),
            PaletteEntry::new(17, 34, 51),
        ]
    );

    let tile = handle.tile_png(&TileRequest::new(1, 0, 2, 2)).unwrap();
    let decoded = decode_png(&tile);
    assert_eq!(decoded.color, ColorType::Indexed);
    assert_eq!(decoded.palette, Some(triples));
    assert_eq!(decoded.data, vec![1, 2, 1, 0]);
}

// =============================================================================
// Addressing
// =============================================================================

#[test]
fn test_tile_rows_are_mapping_slices() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("markers.cache");

    create_and_publish(&cache_path, &mut MarkerDecoder::new(4, 4, 0), &NoLock).unwrap();
    let cache = MappedCache::open(&cache_path).unwrap();
    assert_eq!(cache.header().row_bytes, 12);
    assert_eq!(cache.header().col_bytes, 3);

    let mut encoder = RecordingEncoder::with_base(cache.data());
    extract_tile(&cache.pixels(), &TileRequest::new(1, 1, 2, 2), &mut encoder).unwrap();

    assert_eq!(encoder.offsets, vec![12 + 3, 2 * 12 + 3]);
    assert_eq!(encoder.rows[0], vec![1, 1, 0xEE, 1, 2, 0xEE]);
    assert_eq!(encoder.rows[1], vec![2, 1, 0xEE, 2, 2, 0xEE]);
    assert_eq!(encoder.flushes, 1);
}

#[test]
fn test_padded_rows_use_row_stride() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("padded.cache");

    create_and_publish(&cache_path, &mut MarkerDecoder::new(3, 3, 5), &NoLock).unwrap();
    let cache = MappedCache::open(&cache_path).unwrap();
    let row_bytes = cache.header().row_bytes as usize;
    assert_eq!(row_bytes, 14);

    let mut encoder = RecordingEncoder::with_base(cache.data());
    extract_tile(&cache.pixels(), &TileRequest::new(2, 0, 1, 3), &mut encoder).unwrap();

    assert_eq!(encoder.offsets, vec![6, row_bytes + 6, 2 * row_bytes + 6]);
    assert!(encoder.rows.iter().all(|row| !row.contains(&0xFF)));
}

#[test]
fn test_zoomed_tile_samples_source_grid() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("markers.cache");

    create_and_publish(&cache_path, &mut MarkerDecoder::new(8, 8, 0), &NoLock).unwrap();
    let cache = MappedCache::open(&cache_path).unwrap();

    let mut encoder = RecordingEncoder::default();
    let request = TileRequest::new(1, 2, 3, 2).with_zoom(1);
    extract_tile(&cache.pixels(), &request, &mut encoder).unwrap();

    // Output (c, r) is source (1 + 2c, 2 + 2r)
    assert_eq!(
        encoder.rows,
        vec![
            vec![2, 1, 0xEE, 2, 3, 0xEE, 2, 5, 0xEE],
            vec![4, 1, 0xEE, 4, 3, 0xEE, 4, 5, 0xEE],
        ]
    );
}

#[test]
fn test_out_of_bounds_requests() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("markers.cache");

    create_and_publish(&cache_path, &mut MarkerDecoder::new(4, 4, 0), &NoLock).unwrap();
    let cache = MappedCache::open(&cache_path).unwrap();
    let pixels = cache.pixels();

    let cases = [
        (TileRequest::new(0, 0, 0, 1), ErrorKind::TileDim),
        (TileRequest::new(3, 0, 2, 1), ErrorKind::TileClip),
        (TileRequest::new(0, 4, 1, 1), ErrorKind::TileClip),
        (TileRequest::new(0, 0, 3, 3).with_zoom(1), ErrorKind::TileClip),
        (TileRequest::new(0, 0, 1, 1).with_zoom(9), ErrorKind::TileZoom),
    ];

    for (request, kind) in cases {
        let mut encoder = RecordingEncoder::default();
        let err = extract_tile(&pixels, &request, &mut encoder).unwrap_err();
        assert_eq!(err.kind(), kind, "{:?}", request);
        assert!(encoder.rows.is_empty());
    }
}
