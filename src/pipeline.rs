//! Build coordination: scan, fan out, drain, finalize.
//!
//! One build runs three worker groups over unbounded FIFO queues:
//!
//! 1. image workers, transcoding stale sources into thumbnail and full-size
//!    artifacts,
//! 2. renderer workers, writing index pages for stale directories,
//! 3. a single feed aggregator, collecting one entry per image.
//!
//! Shutdown is two-phase and driven purely by channel closure. The scanner
//! closes the image queue when the walk ends; the coordinator closes the
//! renderer queue after dispatching the stale directory records. Once both
//! pools have drained, the coordinator drops its feed sender — at that point
//! the image workers' clones are already gone, the aggregator's receive loop
//! ends, and the feed finalizes knowing it has seen every entry. No feed
//! item can ever reference a half-written artifact.
//!
//! A worker that hits a fatal error raises a shared abort flag and returns
//! the error. The remaining workers see the flag, drain their queues without
//! doing further work, and the build reports the first failure.

use crate::assets;
use crate::config::{ConfigError, GalleryConfig, effective_workers};
use crate::feed::{self, FeedEntry};
use crate::process::{self, ProcessError};
use crate::render::{self, RenderError};
use crate::scan::{self, DirRecord, ScanError};
use crate::stale::{self, OutputIndex};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("failed to process image {path}: {source}")]
    Image {
        path: PathBuf,
        source: ProcessError,
    },
    #[error("failed to render index for {path}: {source}")]
    Page {
        path: PathBuf,
        source: RenderError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What one build actually did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    /// Images transcoded (thumbnail plus full-size pairs written).
    pub images: usize,
    /// Index pages rendered.
    pub pages: usize,
    /// Whether a feed file was written.
    pub feed_written: bool,
}

/// What a build would do, without doing it.
#[derive(Debug, Default)]
pub struct Plan {
    pub stale_images: Vec<PathBuf>,
    pub stale_pages: Vec<PathBuf>,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        self.stale_images.is_empty() && self.stale_pages.is_empty()
    }
}

/// Run one full incremental build.
pub fn build(config: &GalleryConfig) -> Result<BuildReport, BuildError> {
    config.validate()?;
    let output = OutputIndex::scan(&config.output)?;
    let workers = effective_workers(config);
    let abort = AtomicBool::new(false);

    let (img_tx, img_rx) = unbounded::<PathBuf>();
    let (dir_tx, dir_rx) = unbounded::<DirRecord>();
    let (feed_tx, feed_rx) = unbounded::<FeedEntry>();

    log::info!(
        "building {} -> {} with {workers} workers per stage",
        config.originals.display(),
        config.output.display()
    );

    let (report, failure) = thread::scope(|s| {
        let aggregator = s.spawn(|| feed::aggregate(config, feed_rx));

        let image_handles: Vec<_> = (0..workers)
            .map(|_| {
                let rx = img_rx.clone();
                let tx = feed_tx.clone();
                let abort = &abort;
                s.spawn(move || image_worker(config, rx, tx, abort))
            })
            .collect();
        drop(img_rx);

        let dir_handles: Vec<_> = (0..workers)
            .map(|_| {
                let rx = dir_rx.clone();
                let abort = &abort;
                s.spawn(move || dir_worker(config, rx, abort))
            })
            .collect();
        drop(dir_rx);

        // The scan enqueues stale images as it goes, so transcoding overlaps
        // with discovery. Directory records only become final once the walk
        // completes, so they are dispatched afterwards.
        let scanned = scan::scan_tree(config, &output, &img_tx, &feed_tx, &abort);
        drop(img_tx);

        let mut first_error: Option<BuildError> = None;
        match scanned {
            // A raised abort flag means the walk was cut short and the
            // records may list only part of their directories. The scan ran
            // on this thread, so this load observes its own break. A
            // truncated listing must never reach a renderer: an incomplete
            // index page would carry a fresh mtime and read as up to date
            // on every later run.
            Ok(index) if !abort.load(Ordering::Relaxed) => {
                for record in index.into_stale_records() {
                    // Receivers are gone only if the pool already aborted.
                    let _ = dir_tx.send(record);
                }
            }
            Ok(_) => {}
            Err(e) => {
                abort.store(true, Ordering::Relaxed);
                first_error = Some(e.into());
            }
        }
        drop(dir_tx);

        // Phase one: drain both task pools.
        let mut images = 0;
        for handle in image_handles {
            match handle.join().expect("image worker panicked") {
                Ok(n) => images += n,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        let mut pages = 0;
        for handle in dir_handles {
            match handle.join().expect("renderer worker panicked") {
                Ok(n) => pages += n,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        // Phase two: all producers are gone, close the feed and finalize.
        drop(feed_tx);
        let feed_written = aggregator.join().expect("feed aggregator panicked");

        (
            BuildReport {
                images,
                pages,
                feed_written,
            },
            first_error,
        )
    });

    if let Some(e) = failure {
        return Err(e);
    }
    assets::sync(&config.output)?;
    log::info!(
        "build done: {} images, {} pages, feed written: {}",
        report.images,
        report.pages,
        report.feed_written
    );
    Ok(report)
}

/// Compute what a build would rebuild, writing nothing.
///
/// The only side effect is creating the output root when it is missing,
/// which a subsequent build would do anyway.
pub fn plan(config: &GalleryConfig) -> Result<Plan, BuildError> {
    config.validate()?;
    let output = OutputIndex::scan(&config.output)?;
    let (img_tx, img_rx) = unbounded();
    let (feed_tx, feed_rx) = unbounded();
    let abort = AtomicBool::new(false);

    let index = scan::scan_tree(config, &output, &img_tx, &feed_tx, &abort)?;
    drop(img_tx);
    drop(feed_tx);
    drop(feed_rx);

    Ok(Plan {
        stale_images: img_rx.iter().collect(),
        stale_pages: index
            .into_stale_records()
            .map(|r| stale::index_path(config, &r.path))
            .collect(),
    })
}

/// Transcode images until the queue closes.
///
/// After a failure anywhere in the pool, remaining tasks are consumed but
/// skipped so the build winds down promptly.
fn image_worker(
    config: &GalleryConfig,
    tasks: Receiver<PathBuf>,
    feed_tx: Sender<FeedEntry>,
    abort: &AtomicBool,
) -> Result<usize, BuildError> {
    let mut done = 0;
    for path in tasks.iter() {
        if abort.load(Ordering::Relaxed) {
            continue;
        }
        match process::process_image(config, &path) {
            Ok(Some(entry)) => {
                done += 1;
                let _ = feed_tx.send(entry);
            }
            Ok(None) => done += 1,
            Err(source) => {
                abort.store(true, Ordering::Relaxed);
                log::error!("failed to process {}: {source}", path.display());
                return Err(BuildError::Image { path, source });
            }
        }
    }
    Ok(done)
}

/// Render index pages until the queue closes.
fn dir_worker(
    config: &GalleryConfig,
    tasks: Receiver<DirRecord>,
    abort: &AtomicBool,
) -> Result<usize, BuildError> {
    let mut done = 0;
    for record in tasks.iter() {
        if abort.load(Ordering::Relaxed) {
            continue;
        }
        match render::render_directory(config, &record) {
            Ok(()) => done += 1,
            Err(source) => {
                abort.store(true, Ordering::Relaxed);
                log::error!(
                    "failed to render index for {}: {source}",
                    record.path.display()
                );
                return Err(BuildError::Page {
                    path: record.path,
                    source,
                });
            }
        }
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> GalleryConfig {
        let config = GalleryConfig {
            originals: tmp.path().join("originals"),
            output: tmp.path().join("output"),
            thumbnail_size: 50,
            full_size: 400,
            workers: Some(2),
            ..Default::default()
        };
        fs::create_dir_all(&config.originals).unwrap();
        config
    }

    fn write_test_jpeg(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        })
        .save(path)
        .unwrap();
    }

    #[test]
    fn full_build_produces_all_artifacts() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        write_test_jpeg(&config.originals.join("a/x.jpg"), 200, 100);
        write_test_jpeg(&config.originals.join("a/b/y.jpg"), 100, 200);

        let report = build(&config).unwrap();
        assert_eq!(report.images, 2);
        // root, a, a/b all list content and are new.
        assert_eq!(report.pages, 3);
        assert!(!report.feed_written);

        for artifact in [
            "a/thumb_x.jpg",
            "a/full_x.jpg",
            "a/b/thumb_y.jpg",
            "a/b/full_y.jpg",
            "index.html",
            "a/index.html",
            "a/b/index.html",
            "gallery.css",
            "gallery.js",
            "folder.svg",
        ] {
            assert!(
                config.output.join(artifact).exists(),
                "missing {artifact}"
            );
        }
    }

    #[test]
    fn second_build_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        write_test_jpeg(&config.originals.join("x.jpg"), 120, 80);

        let first = build(&config).unwrap();
        assert_eq!(first.images, 1);

        let second = build(&config).unwrap();
        assert_eq!(second.images, 0);
        assert_eq!(second.pages, 0);
    }

    #[test]
    fn touched_source_rebuilds_image_and_parent_page() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let source = config.originals.join("a/x.jpg");
        write_test_jpeg(&source, 120, 80);
        write_test_jpeg(&config.originals.join("a/z.jpg"), 120, 80);
        build(&config).unwrap();

        let future = filetime::FileTime::from_unix_time(
            filetime::FileTime::now().unix_seconds() + 3600,
            0,
        );
        filetime::set_file_mtime(&source, future).unwrap();

        let report = build(&config).unwrap();
        assert_eq!(report.images, 1);
        // Only x.jpg's parent is re-rendered; "a" is the root's only child
        // but the root itself did not change.
        assert_eq!(report.pages, 1);
    }

    #[test]
    fn empty_directories_get_no_index() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        fs::create_dir_all(config.originals.join("vacant")).unwrap();
        write_test_jpeg(&config.originals.join("a/x.jpg"), 120, 80);

        build(&config).unwrap();
        assert!(!config.output.join("vacant/index.html").exists());
        // The root lists both "a" and "vacant" as folders, so it renders.
        assert!(config.output.join("index.html").exists());
    }

    #[test]
    fn broken_image_aborts_the_build() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        fs::create_dir_all(&config.originals).unwrap();
        fs::write(config.originals.join("broken.jpg"), b"not a jpeg").unwrap();
        write_test_jpeg(&config.originals.join("ok.jpg"), 120, 80);

        let result = build(&config);
        assert!(matches!(result, Err(BuildError::Image { .. })));
    }

    #[test]
    fn failed_build_never_leaves_a_truncated_index_page() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        fs::create_dir_all(&config.originals).unwrap();
        // Sorts first, so the failure can be in flight while the walk is
        // still attaching the remaining files.
        fs::write(config.originals.join("a_broken.jpg"), b"not a jpeg").unwrap();
        write_test_jpeg(&config.originals.join("z_ok.jpg"), 120, 80);

        assert!(matches!(build(&config), Err(BuildError::Image { .. })));

        // Whether or not the walk finished before the abort, the root index
        // is either absent or lists every image of the directory.
        let index = config.output.join("index.html");
        if index.exists() {
            let html = fs::read_to_string(&index).unwrap();
            assert!(html.contains("z_ok.jpg"));
        }
    }

    #[test]
    fn feed_written_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.rss_feed = true;
        config.gallery_url = "https://example.com".to_string();
        write_test_jpeg(&config.originals.join("x.jpg"), 120, 80);

        let report = build(&config).unwrap();
        assert!(report.feed_written);
        let xml = fs::read_to_string(config.output.join("rss.xml")).unwrap();
        assert!(xml.contains("<title>x.jpg</title>"));
        assert!(xml.contains("https://example.com/#x.jpg"));
    }

    #[test]
    fn plan_reports_stale_work_without_writing() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        write_test_jpeg(&config.originals.join("a/x.jpg"), 120, 80);

        let p = plan(&config).unwrap();
        assert_eq!(p.stale_images, vec![config.originals.join("a/x.jpg")]);
        assert_eq!(p.stale_pages.len(), 2); // root and "a"
        assert!(!p.is_noop());
        assert!(!config.output.join("a/thumb_x.jpg").exists());

        build(&config).unwrap();
        assert!(plan(&config).unwrap().is_noop());
    }

    #[test]
    fn invalid_config_rejected_before_any_work() {
        let tmp = TempDir::new().unwrap();
        let config = GalleryConfig {
            originals: tmp.path().join("same"),
            output: tmp.path().join("same"),
            ..Default::default()
        };
        assert!(matches!(build(&config), Err(BuildError::Config(_))));
        assert!(!tmp.path().join("same").exists());
    }
}
