//! Cache engine integration tests.
//!
//! Tests verify:
//! - Readers never observe a partially written cache
//! - Readers that mapped the old cache keep the old content
//! - Concurrent writers never mix their rows in one cache
//! - Freshness follows the source and cache modification times
//! - Header arithmetic holds for every opened cache
//! - Failed creates leave the committed cache untouched

use std::fs;
use std::thread;
use std::time::{Duration, SystemTime};

use pngtile::cache::{LockFile, NoLock};
use pngtile::{
    cache_path_for, check_status, create_and_publish, temp_path_for, CacheStatus, ErrorKind,
    MappedCache, HEADER_SIZE,
};

use super::test_utils::{set_mtime, FailingDecoder, PngFixture, SolidDecoder};

// =============================================================================
// Atomic Publication
// =============================================================================

#[test]
fn test_reader_never_sees_partial_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("image.cache");

    let old_size = HEADER_SIZE as u64 + 8 * 8;
    let new_size = HEADER_SIZE as u64 + 32 * 32;

    create_and_publish(&cache_path, &mut SolidDecoder::new(8, 8, 1), &NoLock).unwrap();

    let writer_path = cache_path.clone();
    let writer = thread::spawn(move || {
        let mut decoder = SolidDecoder::new(32, 32, 2).with_delay(Duration::from_millis(2));
        create_and_publish(&writer_path, &mut decoder, &NoLock).map(|_| ())
    });

    let mut opens = 0usize;
    while !writer.is_finished() {
        match MappedCache::open(&cache_path) {
            Ok(cache) => {
                let len = cache.mapped_len() as u64;
                assert!(len == old_size || len == new_size, "partial cache of {} bytes", len);

                let fill = if len == old_size { 1 } else { 2 };
                assert!(cache.data().iter().all(|&b| b == fill));
                opens += 1;
            }
            Err(e) => assert_eq!(e.kind(), ErrorKind::CacheOpenRead),
        }
    }

    writer.join().unwrap().unwrap();
    assert!(opens > 0);

    let cache = MappedCache::open(&cache_path).unwrap();
    assert_eq!(cache.mapped_len() as u64, new_size);
}

#[test]
fn test_second_writer_cannot_share_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("image.cache");
    let temp_path = temp_path_for(&cache_path).unwrap();

    let writer_path = cache_path.clone();
    let slow = thread::spawn(move || {
        let mut decoder = SolidDecoder::new(16, 16, 1).with_delay(Duration::from_millis(5));
        create_and_publish(&writer_path, &mut decoder, &NoLock).map(|_| ())
    });

    while !temp_path.exists() && !slow.is_finished() {
        thread::sleep(Duration::from_millis(1));
    }
    let fast = create_and_publish(&cache_path, &mut SolidDecoder::new(8, 8, 2), &NoLock)
        .map(|_| ());
    let slow = slow.join().unwrap();

    let mut winners = Vec::new();
    for (result, fill, side) in [(&slow, 1u8, 16u64), (&fast, 2, 8)] {
        match result {
            Ok(()) => winners.push((fill, HEADER_SIZE as u64 + side * side)),
            Err(e) => assert_eq!(e.kind(), ErrorKind::CacheOpenTmp),
        }
    }
    assert!(!winners.is_empty());

    let cache = MappedCache::open(&cache_path).unwrap();
    let fill = cache.data()[0];
    assert!(cache.data().iter().all(|&b| b == fill));
    assert!(winners.contains(&(fill, cache.mapped_len() as u64)));
}

#[test]
fn test_old_mapping_survives_republish() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("image.cache");

    create_and_publish(&cache_path, &mut SolidDecoder::new(4, 4, 7), &NoLock).unwrap();
    let old = MappedCache::open(&cache_path).unwrap();

    let new = create_and_publish(&cache_path, &mut SolidDecoder::new(6, 2, 9), &NoLock).unwrap();

    assert_eq!(old.header().width, 4);
    assert!(old.data().iter().all(|&b| b == 7));
    assert_eq!(new.header().width, 6);
    assert!(new.data().iter().all(|&b| b == 9));
}

#[test]
fn test_failed_create_keeps_previous_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("image.cache");

    create_and_publish(&cache_path, &mut SolidDecoder::new(4, 4, 3), &NoLock).unwrap();

    let err = create_and_publish(&cache_path, &mut FailingDecoder::new(10, 10, 5), &NoLock)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Codec);

    let cache = MappedCache::open(&cache_path).unwrap();
    assert_eq!(cache.header().width, 4);
    assert!(cache.data().iter().all(|&b| b == 3));

    // The temp file is left behind and reused by the next create
    let temp_path = temp_path_for(&cache_path).unwrap();
    assert!(temp_path.exists());

    create_and_publish(&cache_path, &mut SolidDecoder::new(2, 2, 4), &NoLock).unwrap();
    assert!(!temp_path.exists());
    assert_eq!(MappedCache::open(&cache_path).unwrap().header().width, 2);
}

// =============================================================================
// Writer Lock
// =============================================================================

#[test]
fn test_lock_file_blocks_second_writer() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("image.cache");
    let lock_path = dir.path().join("image.lock");

    fs::write(&lock_path, b"").unwrap();
    let lock = LockFile::with_timeout(Duration::from_millis(100));

    let err = create_and_publish(&cache_path, &mut SolidDecoder::new(2, 2, 1), &lock).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CacheLock);
    assert!(!cache_path.exists());

    fs::remove_file(&lock_path).unwrap();
    create_and_publish(&cache_path, &mut SolidDecoder::new(2, 2, 1), &lock).unwrap();
    assert!(cache_path.exists());
    assert!(!lock_path.exists());
}

// =============================================================================
// Freshness
// =============================================================================

#[test]
fn test_freshness_follows_mtimes() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("image.png");
    let cache_path = cache_path_for(&source).unwrap();

    PngFixture::patterned(3, 3, png::ColorType::Grayscale, png::BitDepth::Eight).write(&source);
    assert_eq!(check_status(&source, &cache_path).unwrap(), CacheStatus::Absent);

    create_and_publish(&cache_path, &mut SolidDecoder::new(3, 3, 0), &NoLock).unwrap();

    let base = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&cache_path, base);

    set_mtime(&source, base - Duration::from_secs(10));
    assert_eq!(check_status(&source, &cache_path).unwrap(), CacheStatus::Fresh);

    set_mtime(&source, base);
    assert_eq!(check_status(&source, &cache_path).unwrap(), CacheStatus::Fresh);

    // Moving only the source forward flips fresh to stale
    set_mtime(&source, base + Duration::from_secs(10));
    assert_eq!(check_status(&source, &cache_path).unwrap(), CacheStatus::Stale);

    set_mtime(&source, base + Duration::from_secs(20));
    assert_eq!(check_status(&source, &cache_path).unwrap(), CacheStatus::Stale);

    fs::remove_file(&cache_path).unwrap();
    assert_eq!(check_status(&source, &cache_path).unwrap(), CacheStatus::Absent);
}

#[test]
fn test_freshness_requires_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("missing.png");

    let err = check_status(&source, &cache_path_for(&source).unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImageStat);
}

// =============================================================================
// Header Arithmetic
// =============================================================================

#[test]
fn test_mapped_size_matches_header() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("image.cache");

    for (width, height) in [(1, 1), (3, 7), (64, 5)] {
        create_and_publish(&cache_path, &mut SolidDecoder::new(width, height, 1), &NoLock).unwrap();

        let cache = MappedCache::open(&cache_path).unwrap();
        let header = cache.header();
        assert_eq!(
            cache.mapped_len() as u64,
            HEADER_SIZE as u64 + header.row_bytes as u64 * header.height as u64
        );
        assert!(header.row_bytes >= header.width * header.col_bytes as u32);
        assert_eq!(
            fs::metadata(&cache_path).unwrap().len(),
            cache.mapped_len() as u64
        );
    }
}

#[test]
fn test_open_rejects_truncated_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("image.cache");

    create_and_publish(&cache_path, &mut SolidDecoder::new(8, 8, 1), &NoLock).unwrap();
    let file = fs::OpenOptions::new().write(true).open(&cache_path).unwrap();
    file.set_len(HEADER_SIZE as u64 + 10).unwrap();
    drop(file);

    let err = MappedCache::open(&cache_path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CacheFormat);
}
