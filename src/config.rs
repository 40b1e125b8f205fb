//! Gallery configuration module.
//!
//! Handles loading and validating `gallery.toml`. Configuration is a single
//! flat file at the working directory root — there is no cascade. A missing
//! file is not an error: stock defaults apply and a note is logged.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! name = "Photo Gallery"        # Gallery title, used in pages and the feed
//! copyright = ""                # Footer / feed copyright line
//! originals = "originals"       # Source photo tree (read-only)
//! output = "output"             # Generated site root (mirrors originals)
//!
//! thumbnail_size = 200          # Thumbnail width in pixels
//! full_size = 2000              # Longer edge of the display copy
//! jpeg_quality = 90             # JPEG encoding quality (1-100)
//! copy_originals = false        # Copy sources verbatim instead of resizing
//!
//! image_order = "alphabetical"  # "alphabetical" | "newest" | "oldest"
//!
//! rss_feed = false              # Write rss.xml at the output root
//! gallery_url = ""              # Public base URL, e.g. "https://example.com"
//! gallery_path = "/"            # Path the gallery is served under
//!
//! # Max parallel workers per stage (omit for auto = CPU cores)
//! #workers = 4
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Ordering policy for images on an index page.
///
/// Applied as a stable sort, so entries with equal modification times keep
/// their alphabetical relative order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOrder {
    /// Natural listing order (by file name).
    #[default]
    Alphabetical,
    /// Descending by modification time.
    Newest,
    /// Ascending by modification time.
    Oldest,
}

/// Gallery configuration loaded from `gallery.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Gallery title, shown on every page and in the feed channel.
    pub name: String,
    /// Copyright line for page footers and the feed.
    pub copyright: String,
    /// Root of the source photo tree. Never written to.
    pub originals: PathBuf,
    /// Root of the generated site. Mirrors the source tree's structure.
    pub output: PathBuf,
    /// Thumbnail width in pixels; height follows the source aspect ratio.
    pub thumbnail_size: u32,
    /// Longer edge of the full-size display copy, in pixels.
    pub full_size: u32,
    /// JPEG encoding quality, 1-100.
    pub jpeg_quality: u8,
    /// Copy source files verbatim as the full-size artifact.
    pub copy_originals: bool,
    /// Image ordering policy for index pages.
    pub image_order: ImageOrder,
    /// Whether to write an RSS feed at the output root.
    pub rss_feed: bool,
    /// Public base URL the gallery is served from, e.g. `https://example.com`.
    pub gallery_url: String,
    /// Path under `gallery_url` the gallery lives at, e.g. `/photos`.
    pub gallery_path: String,
    /// Maximum parallel workers per pipeline stage.
    /// When absent, defaults to the number of CPU cores.
    pub workers: Option<usize>,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            name: "Photo Gallery".to_string(),
            copyright: String::new(),
            originals: PathBuf::from("originals"),
            output: PathBuf::from("output"),
            thumbnail_size: 200,
            full_size: 2000,
            jpeg_quality: 90,
            copy_originals: false,
            image_order: ImageOrder::Alphabetical,
            rss_feed: false,
            gallery_url: String::new(),
            gallery_path: "/".to_string(),
            workers: None,
        }
    }
}

impl GalleryConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields the stock defaults; any other read or parse
    /// failure is an error. The result is validated before being returned,
    /// so no pipeline stage ever sees an invalid configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no config file at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.originals == self.output {
            return Err(ConfigError::Validation(
                "the \"originals\" and \"output\" directories cannot be the same".into(),
            ));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::Validation("jpeg_quality must be 1-100".into()));
        }
        if self.thumbnail_size == 0 {
            return Err(ConfigError::Validation(
                "thumbnail_size must be non-zero".into(),
            ));
        }
        if self.full_size == 0 {
            return Err(ConfigError::Validation("full_size must be non-zero".into()));
        }
        Ok(())
    }

    /// Source path relative to the originals root.
    ///
    /// Panics if `path` is not under the originals root; the scanner only
    /// ever hands out paths it discovered there.
    pub fn rel_source<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.originals)
            .expect("path originates from the originals tree")
    }

    /// Output directory mirroring the source directory `dir`.
    pub fn mirror_dir(&self, dir: &Path) -> PathBuf {
        self.output.join(self.rel_source(dir))
    }

    /// Public URL of the directory mirroring source directory `dir`.
    pub fn public_dir_url(&self, dir: &Path) -> String {
        let mut url = join_url(&self.gallery_url, &self.gallery_path);
        let rel = self.rel_source(dir).to_string_lossy();
        if !rel.is_empty() {
            url = join_url(&url, &rel);
        }
        url
    }
}

/// Resolve the effective worker count per pipeline stage.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_workers(config: &GalleryConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.workers.map(|n| n.min(cores).max(1)).unwrap_or(cores)
}

/// Join two URL segments with exactly one `/` between them.
pub fn join_url(base: &str, seg: &str) -> String {
    let base = base.trim_end_matches('/');
    let seg = seg.trim_start_matches('/');
    if seg.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{seg}")
    }
}

/// A stock `gallery.toml` with every option documented, for `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r#"# fotogal configuration. All options shown with their defaults.

# Gallery title, used in pages and the feed channel.
name = "Photo Gallery"

# Footer / feed copyright line.
copyright = ""

# Source photo tree (read-only) and generated site root.
# These must not be the same directory.
originals = "originals"
output = "output"

# Thumbnail width in pixels; height follows the source aspect ratio.
thumbnail_size = 200

# Longer edge of the full-size display copy, in pixels.
full_size = 2000

# JPEG encoding quality, 1-100.
jpeg_quality = 90

# Copy source files verbatim as the full-size artifact instead of resizing.
copy_originals = false

# Image ordering on index pages: "alphabetical" | "newest" | "oldest".
image_order = "alphabetical"

# RSS feed of recently added images, written to <output>/rss.xml.
rss_feed = false

# Public base URL and path, used for feed links.
gallery_url = ""
gallery_path = "/"

# Max parallel workers per stage. Omit for auto (CPU cores).
#workers = 4
"#
}
