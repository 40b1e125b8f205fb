//! Staleness decisions: which derived artifacts are missing or outdated.
//!
//! Decisions are a pure function of source and output modification times —
//! no content hashing. A source file touched but not changed still triggers
//! a rebuild; that imprecision is accepted. "Older than" is strict
//! (`source > output`): equal timestamps count as up to date, so coarse
//! filesystem timestamp resolution never causes spurious rebuilds.

use crate::config::GalleryConfig;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Snapshot of the output tree: every path mapped to its modification time.
///
/// Taken once per build, before the source scan. This is the only state that
/// survives across runs — the next build re-derives all decisions from it.
#[derive(Debug, Default)]
pub struct OutputIndex {
    mtimes: BTreeMap<PathBuf, SystemTime>,
}

impl OutputIndex {
    /// Walk the output root and record every entry's mtime.
    ///
    /// A missing output root is not an error: it is created empty, matching
    /// a first-run build.
    pub fn scan(output_root: &Path) -> io::Result<Self> {
        if !output_root.exists() {
            log::info!("creating output directory {}", output_root.display());
            fs::create_dir_all(output_root)?;
            return Ok(Self::default());
        }
        let mut mtimes = BTreeMap::new();
        for entry in WalkDir::new(output_root) {
            let entry = entry.map_err(io::Error::other)?;
            let modified = entry.metadata().map_err(io::Error::other)?.modified()?;
            mtimes.insert(entry.into_path(), modified);
        }
        Ok(Self { mtimes })
    }

    pub fn mtime(&self, path: &Path) -> Option<SystemTime> {
        self.mtimes.get(path).copied()
    }

    /// Stale when the artifact is missing or strictly older than the source.
    pub fn is_stale(&self, artifact: &Path, source_mtime: SystemTime) -> bool {
        match self.mtime(artifact) {
            Some(output_mtime) => source_mtime > output_mtime,
            None => true,
        }
    }
}

/// Path of the generated index page for source directory `dir`.
pub fn index_path(config: &GalleryConfig, dir: &Path) -> PathBuf {
    config.mirror_dir(dir).join("index.html")
}

/// Paths of the two derived artifacts for a source image.
pub fn artifact_paths(config: &GalleryConfig, image: &Path) -> (PathBuf, PathBuf) {
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = config.mirror_dir(image.parent().unwrap_or(&config.originals));
    (
        dir.join(format!("thumb_{name}")),
        dir.join(format!("full_{name}")),
    )
}

/// Whether a source image needs its thumbnail and full-size artifacts rebuilt.
pub fn image_is_stale(
    config: &GalleryConfig,
    output: &OutputIndex,
    image: &Path,
    source_mtime: SystemTime,
) -> bool {
    let (thumb, full) = artifact_paths(config, image);
    output.is_stale(&thumb, source_mtime) || output.is_stale(&full, source_mtime)
}

/// Whether a source directory needs its index page re-rendered.
///
/// This covers only the directory's own mtime; the scanner additionally
/// flags a directory when any image inside it required rebuilding.
pub fn dir_is_stale(
    config: &GalleryConfig,
    output: &OutputIndex,
    dir: &Path,
    source_mtime: SystemTime,
) -> bool {
    output.is_stale(&index_path(config, dir), source_mtime)
}
