//! pngtile - decode-once tile cache for PNG images.
//!
//! Brings the cache of every given image up to date, prints its info and
//! optionally renders one tile.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

use pngtile::{
    cache::WriterLock,
    config::Config,
    handle::{CacheHandle, OpenMode},
};

fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.log_filter());

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let images = match collect_images(&config) {
        Ok(images) => images,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some([r, g, b, a]) = config.background {
        warn!(
            "Background {:02x}{:02x}{:02x}{:02x} has no effect: tiles never extend past the image",
            r, g, b, a
        );
    }

    let lock = config.writer_lock();
    let multiple = images.len() > 1;
    let mut failures = 0usize;

    for image in &images {
        if let Err(e) = process_image(&config, image, Arc::clone(&lock), multiple) {
            error!("{}: {}", image.display(), e);
            failures += 1;
        }
    }

    if failures > 0 {
        error!("{} of {} image(s) failed", failures, images.len());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Image Discovery
// =============================================================================

/// Expand the configured paths, walking directories when `--recursive` is set.
fn collect_images(config: &Config) -> Result<Vec<PathBuf>, String> {
    let mut images = Vec::new();

    for path in &config.paths {
        if !path.is_dir() {
            images.push(path.clone());
            continue;
        }

        if !config.recursive {
            return Err(format!(
                "{} is a directory; use --recursive to process it",
                path.display()
            ));
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| format!("Failed to walk {}: {}", path.display(), e))?;
            if entry.file_type().is_file() && is_png(entry.path()) {
                images.push(entry.into_path());
            }
        }
    }

    debug!("Found {} image(s)", images.len());
    Ok(images)
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

// =============================================================================
// Per-Image Processing
// =============================================================================

fn process_image(
    config: &Config,
    path: &Path,
    lock: Arc<dyn WriterLock>,
    multiple: bool,
) -> Result<(), String> {
    let mut handle = CacheHandle::new(path, OpenMode::Update)
        .map_err(|e| e.to_string())?
        .with_lock(lock);

    let status = handle
        .open_or_update(config.update)
        .map_err(|e| e.to_string())?;
    info!(
        path = %path.display(),
        status = status.name(),
        updated = config.update || status.needs_update(),
        "Cache ready"
    );

    let image_info = handle.info().map_err(|e| e.to_string())?;

    if config.json {
        let line = serde_json::json!({
            "path": path.display().to_string(),
            "cache": handle.cache_path().display().to_string(),
            "status": status,
            "info": image_info,
        });
        let text = serde_json::to_string(&line).map_err(|e| e.to_string())?;
        println!("{}", text);
    } else {
        println!(
            "{}: {}x{} depth={} color={} cache={} ({} bytes, {})",
            path.display(),
            image_info.image_width,
            image_info.image_height,
            image_info.bit_depth,
            image_info.color_type,
            handle.cache_path().display(),
            image_info.cache_bytes,
            status.name()
        );
    }

    if let Some(out) = &config.tile_out {
        let request = if config.tile_random {
            config.random_tile_request(
                image_info.image_width,
                image_info.image_height,
                &mut rand::thread_rng(),
            )
        } else {
            config.tile_request()
        };
        debug!(
            x = request.x,
            y = request.y,
            width = request.width,
            height = request.height,
            zoom = request.zoom,
            "Rendering tile"
        );
        let bytes = handle.tile_png(&request).map_err(|e| e.to_string())?;

        let target = tile_output_path(out, path, multiple);
        fs::write(&target, &bytes)
            .map_err(|e| format!("Failed to write {}: {}", target.display(), e))?;
        info!(
            path = %target.display(),
            bytes = bytes.len(),
            "Wrote tile"
        );
    }

    handle.close();
    Ok(())
}

/// Where the tile of `image` goes: `out` itself for a single image, otherwise
/// `out` with the image's stem appended.
fn tile_output_path(out: &Path, image: &Path, multiple: bool) -> PathBuf {
    if !multiple {
        return out.to_path_buf();
    }

    let out_stem = out.file_stem().unwrap_or_default().to_string_lossy();
    let image_stem = image.file_stem().unwrap_or_default().to_string_lossy();
    out.with_file_name(format!("{}-{}.png", out_stem, image_stem))
}
