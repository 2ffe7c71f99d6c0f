//! Configuration for the `pngtile` command.
//!
//! Options come from the command line, with environment variable fallbacks
//! using the `PNGTILE_` prefix:
//!
//! - `PNGTILE_RECURSIVE` - Walk directories for `.png` files
//! - `PNGTILE_UPDATE` - Re-create caches even when fresh
//! - `PNGTILE_LOCK` - Serialize cache creation with a `.lock` file
//! - `PNGTILE_LOCK_TIMEOUT` - Seconds to wait for the lock (default: 30)
//! - `PNGTILE_JSON` - Print image info as JSON
//! - `PNGTILE_TILE_OUT` - Write one rendered tile to this path
//! - `PNGTILE_TILE_X`, `PNGTILE_TILE_Y` - Tile origin (default: 0)
//! - `PNGTILE_TILE_WIDTH`, `PNGTILE_TILE_HEIGHT` - Tile size (default: 256)
//! - `PNGTILE_ZOOM` - Tile zoom level (default: 0)
//! - `PNGTILE_TILE_RANDOM` - Pick the tile origin at random within the image
//! - `PNGTILE_BACKGROUND` - Background colour as `RRGGBBAA` hex

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;

use crate::cache::{LockFile, NoLock, WriterLock, DEFAULT_LOCK_TIMEOUT};
use crate::tile::{TileRequest, DEFAULT_TILE_SIZE, MAX_ZOOM};

// =============================================================================
// CLI Arguments
// =============================================================================

/// pngtile - decode-once tile cache for PNG images.
///
/// Decodes each image once into an uncompressed, memory-mapped cache file
/// next to it and serves rectangular tiles straight from the mapping.
#[derive(Parser, Debug, Clone)]
#[command(name = "pngtile")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// PNG images or `.cache` files to process.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Walk directories for `.png` files.
    #[arg(short, long, default_value_t = false, env = "PNGTILE_RECURSIVE")]
    pub recursive: bool,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Re-create caches even when they are fresh.
    #[arg(short, long, default_value_t = false, env = "PNGTILE_UPDATE")]
    pub update: bool,

    /// Serialize cache creation across processes with a `.lock` file.
    #[arg(long, default_value_t = false, env = "PNGTILE_LOCK")]
    pub lock: bool,

    /// Seconds to wait for a competing writer's lock.
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT.as_secs(), env = "PNGTILE_LOCK_TIMEOUT")]
    pub lock_timeout: u64,

    // =========================================================================
    // Output Configuration
    // =========================================================================
    /// Print image info as JSON, one object per line.
    #[arg(long, default_value_t = false, env = "PNGTILE_JSON")]
    pub json: bool,

    /// Render one tile of each image as PNG to this path.
    ///
    /// With several images, the image's file stem is appended.
    #[arg(long, env = "PNGTILE_TILE_OUT")]
    pub tile_out: Option<PathBuf>,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Left edge of the tile in source pixels.
    #[arg(long, default_value_t = 0, env = "PNGTILE_TILE_X")]
    pub tile_x: u32,

    /// Top edge of the tile in source pixels.
    #[arg(long, default_value_t = 0, env = "PNGTILE_TILE_Y")]
    pub tile_y: u32,

    /// Tile width in output pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "PNGTILE_TILE_WIDTH")]
    pub tile_width: u32,

    /// Tile height in output pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "PNGTILE_TILE_HEIGHT")]
    pub tile_height: u32,

    /// Zoom level; each level halves the resolution.
    #[arg(long, default_value_t = 0, env = "PNGTILE_ZOOM")]
    pub zoom: u8,

    /// Ignore `--tile-x`/`--tile-y` and place the tile at a random origin
    /// where it fits inside the image.
    #[arg(long, default_value_t = false, env = "PNGTILE_TILE_RANDOM")]
    pub tile_random: bool,

    /// Background colour for regions outside the image, as `RRGGBBAA` hex.
    ///
    /// Accepted for compatibility only. Tiles must lie inside the image, so
    /// there is never a region to fill and rendering ignores it.
    #[arg(long, value_parser = parse_background, env = "PNGTILE_BACKGROUND")]
    pub background: Option<[u8; 4]>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.paths.is_empty() {
            return Err("At least one image path is required".to_string());
        }

        if self.tile_width == 0 || self.tile_height == 0 {
            return Err("tile_width and tile_height must be greater than 0".to_string());
        }

        if self.zoom > MAX_ZOOM {
            return Err(format!("zoom must be between 0 and {}", MAX_ZOOM));
        }

        if self.verbose && self.quiet {
            return Err("--verbose and --quiet cannot be used together".to_string());
        }

        if self.lock && self.lock_timeout == 0 {
            return Err("lock_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// The tile to render with `--tile-out`.
    pub fn tile_request(&self) -> TileRequest {
        TileRequest::new(self.tile_x, self.tile_y, self.tile_width, self.tile_height)
            .with_zoom(self.zoom)
    }

    /// The tile to render with `--tile-random` for an image of the given
    /// size. Each origin is drawn from the positions where the tile's source
    /// extent fits; an axis the tile does not fit on starts at 0.
    pub fn random_tile_request<R: Rng + ?Sized>(
        &self,
        image_width: u32,
        image_height: u32,
        rng: &mut R,
    ) -> TileRequest {
        let mut request = self.tile_request();
        let (extent_x, extent_y) = request.source_extent();
        request.x = random_origin(image_width, extent_x, rng);
        request.y = random_origin(image_height, extent_y, rng);
        request
    }

    /// The writer lock selected by `--lock`.
    pub fn writer_lock(&self) -> Arc<dyn WriterLock> {
        if self.lock {
            Arc::new(LockFile::with_timeout(Duration::from_secs(self.lock_timeout)))
        } else {
            Arc::new(NoLock)
        }
    }

    /// Log filter directive for the library and binary.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "pngtile=debug"
        } else if self.quiet {
            "pngtile=warn"
        } else {
            "pngtile=info"
        }
    }
}

fn random_origin<R: Rng + ?Sized>(size: u32, extent: u64, rng: &mut R) -> u32 {
    match (size as u64).checked_sub(extent) {
        Some(room) => rng.gen_range(0..=room) as u32,
        None => 0,
    }
}

/// Parse an `RRGGBBAA` hex colour.
pub fn parse_background(value: &str) -> Result<[u8; 4], String> {
    let digits = value.strip_prefix('#').unwrap_or(value);
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!(
            "invalid background '{}': expected 8 hex digits RRGGBBAA",
            value
        ));
    }

    let mut rgba = [0u8; 4];
    for (i, channel) in rgba.iter_mut().enumerate() {
        *channel = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
            .map_err(|e| format!("invalid background '{}': {}", value, e))?;
    }
    Ok(rgba)
}

// =============================================================================
// Tests
// =============================================================================
