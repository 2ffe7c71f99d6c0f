use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Cache Operations
// =============================================================================

/// The filesystem step that failed while handling a cache file.
///
/// Each step maps to its own [`ErrorKind`] so callers can tell which
/// syscall-equivalent went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    /// `stat()` of the cache file
    Stat,
    /// Opening the committed cache file for reading
    OpenRead,
    /// Opening (or creating) the temp file
    OpenTmp,
    /// Removing the temp file
    UnlinkTmp,
    /// Seeking within the cache file
    Seek,
    /// Reading the cache header
    Read,
    /// Writing or flushing cache contents
    Write,
    /// Growing the temp file to its final size
    Truncate,
    /// Mapping the file into memory
    Map,
    /// Unmapping the file
    Unmap,
    /// Closing the file descriptor
    Close,
    /// Renaming the temp file over the cache path
    RenameTmp,
    /// Acquiring the writer lock
    Lock,
}

impl CacheOp {
    /// The error kind reported for a failure of this step.
    pub const fn kind(self) -> ErrorKind {
        match self {
            CacheOp::Stat => ErrorKind::CacheStat,
            CacheOp::OpenRead => ErrorKind::CacheOpenRead,
            CacheOp::OpenTmp => ErrorKind::CacheOpenTmp,
            CacheOp::UnlinkTmp => ErrorKind::CacheUnlinkTmp,
            CacheOp::Seek => ErrorKind::CacheSeek,
            CacheOp::Read => ErrorKind::CacheRead,
            CacheOp::Write => ErrorKind::CacheWrite,
            CacheOp::Truncate => ErrorKind::CacheTruncate,
            CacheOp::Map => ErrorKind::CacheMap,
            CacheOp::Unmap => ErrorKind::CacheUnmap,
            CacheOp::Close => ErrorKind::CacheClose,
            CacheOp::RenameTmp => ErrorKind::CacheRenameTmp,
            CacheOp::Lock => ErrorKind::CacheLock,
        }
    }
}

impl fmt::Display for CacheOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().description())
    }
}

// =============================================================================
// Error Kinds
// =============================================================================

/// Categorical error kind, independent of the context carried by [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Input validation
    Path,
    OpenMode,
    TileDim,
    TileClip,
    TileZoom,

    // Source image
    ImageStat,
    ImageOpen,
    ImageFormat,
    ImageFormatInterlace,
    ImageFormatCache,

    // Codec
    CodecCreate,
    Codec,

    // Cache I/O
    CacheStat,
    CacheOpenRead,
    CacheOpenTmp,
    CacheUnlinkTmp,
    CacheSeek,
    CacheRead,
    CacheWrite,
    CacheTruncate,
    CacheMap,
    CacheUnmap,
    CacheClose,
    CacheRenameTmp,
    CacheLock,

    // Cache content
    /// Reserved: the header carries no version field yet.
    CacheVersion,
    /// Reserved: the header carries no magic field yet.
    CacheMagic,
    CacheFormat,
}

impl ErrorKind {
    /// Short human-readable description of this kind.
    pub const fn description(self) -> &'static str {
        match self {
            ErrorKind::Path => "path",
            ErrorKind::OpenMode => "open_mode",
            ErrorKind::TileDim => "Invalid tile dimensions",
            ErrorKind::TileClip => "Tile outside of image",
            ErrorKind::TileZoom => "Invalid zoom level",
            ErrorKind::ImageStat => "stat(.png)",
            ErrorKind::ImageOpen => "open(.png)",
            ErrorKind::ImageFormat => "Unknown image format",
            ErrorKind::ImageFormatInterlace => "Unsupported image format with interlacing",
            ErrorKind::ImageFormatCache => "Unsupported operation for cache image",
            ErrorKind::CodecCreate => "png_create()",
            ErrorKind::Codec => "png_*()",
            ErrorKind::CacheStat => "stat(.cache)",
            ErrorKind::CacheOpenRead => "open(.cache)",
            ErrorKind::CacheOpenTmp => "open(.tmp)",
            ErrorKind::CacheUnlinkTmp => "unlink(.tmp)",
            ErrorKind::CacheSeek => "seek(.cache)",
            ErrorKind::CacheRead => "read(.cache)",
            ErrorKind::CacheWrite => "write(.cache)",
            ErrorKind::CacheTruncate => "truncate(.cache)",
            ErrorKind::CacheMap => "mmap(.cache)",
            ErrorKind::CacheUnmap => "munmap(.cache)",
            ErrorKind::CacheClose => "close(.cache)",
            ErrorKind::CacheRenameTmp => "rename(.tmp, .cache)",
            ErrorKind::CacheLock => "lock(.cache)",
            ErrorKind::CacheVersion => "Incompatible cache version",
            ErrorKind::CacheMagic => "Incorrect cache magic",
            ErrorKind::CacheFormat => "Invalid cache format",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

// =============================================================================
// Error
// =============================================================================

/// Errors produced by the cache engine and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// A path could not be derived or has no usable extension
    #[error("Invalid path: {path}")]
    InvalidPath { path: PathBuf },

    /// The handle was opened without the access this operation needs
    #[error("Operation requires write access: {path}")]
    ReadOnly { path: PathBuf },

    /// The handle has been closed
    #[error("Cache handle is closed")]
    Closed,

    /// The source image could not be stat'ed
    #[error("stat({path}): {source}")]
    ImageStat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source image could not be opened
    #[error("open({path}): {source}")]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source is not an image this codec understands
    #[error("Unknown image format: {reason}")]
    ImageFormat { reason: String },

    /// Interlaced images cannot be streamed row by row
    #[error("Unsupported image format with interlacing: {path}")]
    Interlaced { path: PathBuf },

    /// The image is itself a cache file and cannot be re-created
    #[error("Unsupported operation for cache image: {path}")]
    CachedImage { path: PathBuf },

    /// The codec could not be set up
    #[error("Codec setup failed: {message}")]
    CodecCreate { message: String },

    /// The codec failed while decoding or encoding
    #[error("Codec error: {message}")]
    Codec { message: String },

    /// A filesystem step on the cache file failed
    #[error("{op} failed for {path}: {source}")]
    CacheIo {
        op: CacheOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The cache file content is structurally invalid
    #[error("Invalid cache format: {reason}")]
    CacheFormat { reason: String },

    /// A tile with zero width or height was requested
    #[error("Invalid tile dimensions: {width}x{height}")]
    TileDim { width: u32, height: u32 },

    /// The tile's source region leaves the image
    #[error(
        "Tile outside of image: {width}x{height} at ({x}, {y}) zoom {zoom}, image is {image_width}x{image_height}"
    )]
    TileClip {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        zoom: u8,
        image_width: u32,
        image_height: u32,
    },

    /// The zoom level is out of range
    #[error("Invalid zoom level: {zoom} (maximum is {max})")]
    TileZoom { zoom: u8, max: u8 },
}

impl Error {
    /// Build a [`Error::CacheIo`] for the given step and path.
    pub fn cache_io(op: CacheOp, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::CacheIo {
            op,
            path: path.into(),
            source,
        }
    }

    /// The categorical kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPath { .. } => ErrorKind::Path,
            Error::ReadOnly { .. } | Error::Closed => ErrorKind::OpenMode,
            Error::ImageStat { .. } => ErrorKind::ImageStat,
            Error::ImageOpen { .. } => ErrorKind::ImageOpen,
            Error::ImageFormat { .. } => ErrorKind::ImageFormat,
            Error::Interlaced { .. } => ErrorKind::ImageFormatInterlace,
            Error::CachedImage { .. } => ErrorKind::ImageFormatCache,
            Error::CodecCreate { .. } => ErrorKind::CodecCreate,
            Error::Codec { .. } => ErrorKind::Codec,
            Error::CacheIo { op, .. } => op.kind(),
            Error::CacheFormat { .. } => ErrorKind::CacheFormat,
            Error::TileDim { .. } => ErrorKind::TileDim,
            Error::TileClip { .. } => ErrorKind::TileClip,
            Error::TileZoom { .. } => ErrorKind::TileZoom,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
