//! Cache handle lifecycle integration tests.
//!
//! Tests verify:
//! - `open_or_update` creates, reuses and refreshes caches as their status requires
//! - Cache images can be tiled but not updated
//! - Read-only handles never write
//! - Closed handles refuse every operation

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use png::{BitDepth, ColorType};

use pngtile::cache::LockFile;
use pngtile::{CacheHandle, CacheStatus, ErrorKind, OpenMode, TileRequest};

use super::test_utils::{decode_png, set_mtime, PngFixture};

#[test]
fn test_open_or_update_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.png");
    PngFixture::patterned(16, 8, ColorType::Rgb, BitDepth::Eight).write(&source);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    assert_eq!(handle.status().unwrap(), CacheStatus::Absent);
    assert_eq!(handle.open_or_update(false).unwrap(), CacheStatus::Absent);
    assert!(handle.is_mapped());
    handle.close();

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    assert_eq!(handle.open_or_update(false).unwrap(), CacheStatus::Fresh);
    handle.close();

    // Touch the source past the cache
    let future = SystemTime::now() + Duration::from_secs(60);
    set_mtime(&source, future);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    assert_eq!(handle.open_or_update(false).unwrap(), CacheStatus::Stale);
    assert!(handle.is_mapped());
}

#[test]
fn test_forced_update_rewrites_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.png");
    PngFixture::patterned(4, 4, ColorType::Grayscale, BitDepth::Eight).write(&source);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    handle.update().unwrap();
    let before = handle.info().unwrap();
    handle.close();

    PngFixture::patterned(6, 2, ColorType::Grayscale, BitDepth::Eight).write(&source);
    let old = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&source, old);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    assert_eq!(handle.open_or_update(true).unwrap(), CacheStatus::Fresh);
    let after = handle.info().unwrap();

    assert_eq!((before.image_width, before.image_height), (4, 4));
    assert_eq!((after.image_width, after.image_height), (6, 2));
}

#[test]
fn test_read_mode_never_writes() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.png");
    PngFixture::patterned(4, 4, ColorType::Grayscale, BitDepth::Eight).write(&source);

    let mut handle = CacheHandle::new(&source, OpenMode::Read).unwrap();
    let err = handle.open_or_update(false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CacheOpenRead);

    assert_eq!(handle.update().unwrap_err().kind(), ErrorKind::OpenMode);
    assert!(!handle.cache_path().exists());
}

#[test]
fn test_cache_image_serves_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.png");
    let fixture = PngFixture::patterned(5, 5, ColorType::Rgba, BitDepth::Eight);
    fixture.write(&source);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    handle.update().unwrap();
    let expected = handle.tile_png(&TileRequest::new(1, 1, 3, 3)).unwrap();
    let cache_path = handle.cache_path().to_path_buf();
    handle.close();

    let mut cached = CacheHandle::new(&cache_path, OpenMode::Update).unwrap();
    assert!(cached.is_cache_image());
    assert_eq!(cached.open_or_update(true).unwrap(), CacheStatus::Fresh);

    let tile = cached.tile_png(&TileRequest::new(1, 1, 3, 3)).unwrap();
    assert_eq!(decode_png(&tile).data, decode_png(&expected).data);

    let err = cached.update().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImageFormatCache);
}

#[test]
fn test_tile_opens_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.png");
    PngFixture::patterned(8, 8, ColorType::Grayscale, BitDepth::Eight).write(&source);

    CacheHandle::new(&source, OpenMode::Update)
        .unwrap()
        .update()
        .unwrap();

    let mut handle = CacheHandle::new(&source, OpenMode::Read).unwrap();
    assert!(!handle.is_mapped());

    let tile = handle.tile_png(&TileRequest::new(0, 0, 4, 4)).unwrap();
    assert!(handle.is_mapped());
    assert_eq!(decode_png(&tile).width, 4);
}

#[test]
fn test_handle_with_lock_releases_it() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.png");
    PngFixture::patterned(4, 4, ColorType::Grayscale, BitDepth::Eight).write(&source);

    let lock = Arc::new(LockFile::with_timeout(Duration::from_secs(1)));
    let mut handle = CacheHandle::new(&source, OpenMode::Update)
        .unwrap()
        .with_lock(lock);

    handle.update().unwrap();
    handle.update().unwrap();
    assert!(!dir.path().join("scan.lock").exists());
}

#[test]
fn test_closed_handle_refuses_operations() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.png");
    PngFixture::patterned(4, 4, ColorType::Grayscale, BitDepth::Eight).write(&source);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    handle.update().unwrap();
    handle.close();

    assert_eq!(handle.open_or_update(false).unwrap_err().kind(), ErrorKind::OpenMode);
    assert_eq!(handle.update().unwrap_err().kind(), ErrorKind::OpenMode);
    assert_eq!(handle.info().unwrap_err().kind(), ErrorKind::OpenMode);
    assert_eq!(
        handle
            .tile_png(&TileRequest::new(0, 0, 1, 1))
            .unwrap_err()
            .kind(),
        ErrorKind::OpenMode
    );
}

#[test]
fn test_info_json() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("scan.png");
    PngFixture::patterned(3, 2, ColorType::Rgb, BitDepth::Sixteen).write(&source);

    let mut handle = CacheHandle::new(&source, OpenMode::Update).unwrap();
    handle.open_or_update(false).unwrap();

    let json = serde_json::to_value(handle.info().unwrap()).unwrap();
    assert_eq!(json["image_width"], 3);
    assert_eq!(json["image_height"], 2);
    assert_eq!(json["bit_depth"], 16);
    assert_eq!(json["color_type"], 2);
    assert_eq!(json["col_bytes"], 6);
    assert_eq!(json["cache_bytes"], pngtile::HEADER_SIZE as u64 + 36);
    assert!(json["cache_modified"].is_u64());
}
