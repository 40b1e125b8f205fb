//! Source tree scanning and the in-memory gallery index.
//!
//! One depth-first, lexicographically ordered walk of the originals root.
//! Directories become [`DirRecord`]s in the [`GalleryIndex`]; files matching
//! the JPEG extension set are attached to their parent record. Because the
//! walk is lexicographic, a parent directory is always visited before its
//! contents, so attaching to the parent never misses.
//!
//! Staleness is decided inline with the walk: a stale image is pushed onto
//! the image queue as soon as it is discovered, so transcoding overlaps with
//! the remainder of the scan. Any filesystem error aborts the build — a
//! partial scan cannot yield a correct staleness decision.

use crate::config::GalleryConfig;
use crate::feed::FeedEntry;
use crate::stale::{self, OutputIndex};
use crossbeam_channel::Sender;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// A qualifying image file: name plus modification time snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub mod_time: SystemTime,
}

/// The accumulated listing for one source directory.
///
/// Owned exclusively by the [`GalleryIndex`] during the scan (single writer),
/// then moved by value to exactly one renderer worker — no mutation after
/// handoff. `files` and `subdirs` hold direct children only, never
/// descendants.
#[derive(Debug, Clone)]
pub struct DirRecord {
    pub path: PathBuf,
    pub name: String,
    pub mod_time: SystemTime,
    /// Direct child images, keyed by absolute path (sorts alphabetically).
    pub files: BTreeMap<PathBuf, FileInfo>,
    /// Direct child directories, keyed by absolute path, valued by name.
    pub subdirs: BTreeMap<PathBuf, String>,
    pub needs_update: bool,
}

impl DirRecord {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.subdirs.is_empty()
    }
}

/// Mapping from source directory path to its [`DirRecord`].
///
/// Built incrementally during the scan, read-only afterwards. A record for a
/// path always exists before anything references it as a parent.
#[derive(Debug, Default)]
pub struct GalleryIndex {
    records: BTreeMap<PathBuf, DirRecord>,
}

impl GalleryIndex {
    /// Register a directory. Idempotent: an existing record is left alone.
    pub fn add_dir(&mut self, path: &Path, name: &str, mod_time: SystemTime, stale: bool) {
        self.records.entry(path.to_path_buf()).or_insert_with(|| {
            log::debug!("registering directory {}", path.display());
            DirRecord {
                path: path.to_path_buf(),
                name: name.to_string(),
                mod_time,
                files: BTreeMap::new(),
                subdirs: BTreeMap::new(),
                needs_update: stale,
            }
        });
    }

    fn attach_subdir(&mut self, parent: &Path, path: &Path, name: &str) {
        if let Some(record) = self.records.get_mut(parent) {
            record.subdirs.insert(path.to_path_buf(), name.to_string());
        }
    }

    fn attach_file(&mut self, parent: &Path, path: &Path, info: FileInfo) {
        if let Some(record) = self.records.get_mut(parent) {
            record.files.insert(path.to_path_buf(), info);
        }
    }

    fn mark_stale(&mut self, dir: &Path) {
        if let Some(record) = self.records.get_mut(dir) {
            record.needs_update = true;
        }
    }

    pub fn get(&self, path: &Path) -> Option<&DirRecord> {
        self.records.get(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume the index, yielding the records that need rendering:
    /// flagged stale and listing at least one child.
    pub fn into_stale_records(self) -> impl Iterator<Item = DirRecord> {
        self.records
            .into_values()
            .filter(|r| r.needs_update && !r.is_empty())
    }
}

fn is_jpeg(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg")
}

/// Walk the originals tree, building the gallery index and enqueueing every
/// stale image path onto `image_tx` as it is discovered.
///
/// For images that are already up to date, a feed entry is reconstructed
/// from the existing thumbnail (when the feed is enabled) so the feed always
/// reflects every image the build knows about, not just the ones it rebuilt.
///
/// A raised `abort` flag stops the walk early. The index returned in that
/// case may hold truncated directory listings; the caller must re-check the
/// flag and discard them rather than render incomplete pages.
pub fn scan_tree(
    config: &GalleryConfig,
    output: &OutputIndex,
    image_tx: &Sender<PathBuf>,
    feed_tx: &Sender<FeedEntry>,
    abort: &AtomicBool,
) -> Result<GalleryIndex, ScanError> {
    let mut index = GalleryIndex::default();
    let walk = WalkDir::new(&config.originals).sort_by_file_name();

    for entry in walk {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let mod_time = entry.metadata()?.modified()?;
        let parent = path.parent().map(Path::to_path_buf);

        if entry.file_type().is_dir() {
            let stale = stale::dir_is_stale(config, output, path, mod_time);
            index.add_dir(path, &name, mod_time, stale);
            if path != config.originals
                && let Some(parent) = &parent
            {
                index.attach_subdir(parent, path, &name);
            }
        } else if is_jpeg(&name) {
            let Some(parent) = &parent else { continue };
            index.attach_file(
                parent,
                path,
                FileInfo {
                    name: name.clone(),
                    mod_time,
                },
            );
            if stale::image_is_stale(config, output, path, mod_time) {
                log::debug!("stale image {}", path.display());
                index.mark_stale(parent);
                // Worker pool may already be gone if the build is aborting.
                let _ = image_tx.send(path.to_path_buf());
            } else if config.rss_feed {
                reconstruct_feed_entry(config, parent, &name, path, feed_tx);
            }
        }
        // Anything else (non-JPEG files) is silently ignored.
    }

    log::info!("scanned {} directories", index.len());
    Ok(index)
}

/// Emit a feed entry for an up-to-date image from its existing thumbnail.
///
/// Best-effort: a thumbnail that cannot be stat'ed just drops out of the
/// feed candidate set.
fn reconstruct_feed_entry(
    config: &GalleryConfig,
    source_dir: &Path,
    name: &str,
    image: &Path,
    feed_tx: &Sender<FeedEntry>,
) {
    let (thumb, _) = stale::artifact_paths(config, image);
    match std::fs::metadata(&thumb).and_then(|m| Ok((m.modified()?, m.len()))) {
        Ok((mtime, len)) => {
            let entry = FeedEntry::for_thumbnail(config, source_dir, name, mtime, len);
            let _ = feed_tx.send(entry);
        }
        Err(e) => log::warn!("cannot stat thumbnail {}: {e}", thumb.display()),
    }
}
