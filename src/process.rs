//! Image transcoding: one source JPEG in, two derived artifacts out.
//!
//! Each call produces a thumbnail (`thumb_<name>`, Lanczos3 resample at the
//! configured width) and a full-size copy (`full_<name>`, either a verbatim
//! copy of the source or a Triangle resample whose longer side equals the
//! configured bound). Both are encoded at the configured JPEG quality and
//! written atomically.
//!
//! Any decode, encode, or I/O failure here is fatal to the whole build: a
//! partially-applied incremental build would read as "up to date" on the
//! next run and silently hide the failure.

use crate::config::GalleryConfig;
use crate::feed::FeedEntry;
use crate::fsutil;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
    #[error("image has no file name: {0}")]
    NoFileName(PathBuf),
}

/// Thumbnail dimensions for a source of `width`×`height` at the configured
/// thumbnail width. Height follows the aspect ratio, never below 1 pixel.
pub fn thumbnail_dimensions(width: u32, height: u32, thumb_width: u32) -> (u32, u32) {
    let aspect = width as f64 / height as f64;
    let thumb_height = (thumb_width as f64 / aspect).round().max(1.0) as u32;
    (thumb_width, thumb_height)
}

/// Full-size dimensions: the longer side equals `bound`, aspect preserved.
pub fn fullsize_dimensions(width: u32, height: u32, bound: u32) -> (u32, u32) {
    let aspect = width as f64 / height as f64;
    if aspect >= 1.0 {
        (bound, (bound as f64 / aspect).round().max(1.0) as u32)
    } else {
        ((bound as f64 * aspect).round().max(1.0) as u32, bound)
    }
}

fn write_jpeg(path: &Path, img: &DynamicImage, quality: u8) -> Result<(), ProcessError> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    img.write_with_encoder(encoder)?;
    fsutil::write_atomic(path, &bytes)?;
    Ok(())
}

/// Process one source image into its two output artifacts.
///
/// Returns the feed entry for the freshly written thumbnail when the feed is
/// enabled. The mirrored output directory is created on demand; concurrent
/// workers racing to create the same directory is fine, `create_dir_all` is
/// a no-op on exists.
pub fn process_image(
    config: &GalleryConfig,
    source: &Path,
) -> Result<Option<FeedEntry>, ProcessError> {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ProcessError::NoFileName(source.to_path_buf()))?;
    let source_dir = source.parent().unwrap_or(&config.originals);
    let out_dir = config.mirror_dir(source_dir);

    log::debug!("processing image {}", source.display());
    let img = ImageReader::open(source)?.decode()?;
    let (width, height) = (img.width(), img.height());

    fs::create_dir_all(&out_dir)?;

    let (tw, th) = thumbnail_dimensions(width, height, config.thumbnail_size);
    let thumb_path = out_dir.join(format!("thumb_{name}"));
    let thumb = img.resize_exact(tw, th, FilterType::Lanczos3);
    write_jpeg(&thumb_path, &thumb, config.jpeg_quality)?;

    let full_path = out_dir.join(format!("full_{name}"));
    if config.copy_originals {
        fsutil::copy_atomic(source, &full_path)?;
    } else {
        let (fw, fh) = fullsize_dimensions(width, height, config.full_size);
        let full = img.resize_exact(fw, fh, FilterType::Triangle);
        write_jpeg(&full_path, &full, config.jpeg_quality)?;
    }

    if !config.rss_feed {
        return Ok(None);
    }
    let meta = fs::metadata(&thumb_path)?;
    Ok(Some(FeedEntry::for_thumbnail(
        config,
        source_dir,
        &name,
        meta.modified()?,
        meta.len(),
    )))
}
