//! Index page rendering for one source directory.
//!
//! A renderer worker receives a finished [`DirRecord`], builds a render
//! model (ordered image tiles, child folders, breadcrumb trail), and writes
//! `index.html` beneath the mirrored output path.
//!
//! HTML is generated with [maud](https://maud.lambda.xyz/): compile-time
//! checked templates with automatic escaping, no template files to ship.

use crate::config::{GalleryConfig, ImageOrder, join_url};
use crate::fsutil;
use crate::scan::DirRecord;
use chrono::Datelike;
use maud::{DOCTYPE, Markup, html};
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One step of the breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub name: String,
    pub href: String,
}

/// One image on the page: file name plus its 1-based display position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTile {
    pub name: String,
    pub index: usize,
}

/// Everything the index template needs, derived from one [`DirRecord`].
#[derive(Debug)]
pub struct PageModel {
    pub gallery_name: String,
    pub copyright: String,
    pub year: i32,
    pub crumbs: Vec<Crumb>,
    pub folders: Vec<String>,
    pub images: Vec<ImageTile>,
    pub stylesheet: String,
    pub script: String,
    pub folder_icon: String,
    pub feed: Option<String>,
}

impl PageModel {
    pub fn build(config: &GalleryConfig, record: &DirRecord) -> Self {
        Self {
            gallery_name: config.name.clone(),
            copyright: config.copyright.clone(),
            year: chrono::Local::now().year(),
            crumbs: breadcrumbs(config, record),
            folders: record.subdirs.values().cloned().collect(),
            images: ordered_tiles(config.image_order, record),
            stylesheet: join_url(&config.gallery_path, "gallery.css"),
            script: join_url(&config.gallery_path, "gallery.js"),
            folder_icon: join_url(&config.gallery_path, "folder.svg"),
            feed: config
                .rss_feed
                .then(|| join_url(&config.gallery_path, "rss.xml")),
        }
    }
}

/// Breadcrumb trail: the gallery root plus one crumb per path component,
/// each linking to the accumulated prefix.
fn breadcrumbs(config: &GalleryConfig, record: &DirRecord) -> Vec<Crumb> {
    let root = if config.gallery_path.is_empty() {
        "/".to_string()
    } else {
        config.gallery_path.clone()
    };
    let mut crumbs = vec![Crumb {
        name: config.name.clone(),
        href: root.clone(),
    }];
    let rel = config.rel_source(&record.path);
    let mut prefix = String::new();
    // Component iteration keeps this independent of the host's separator;
    // URLs always join with `/`.
    for component in rel.components() {
        let part = component.as_os_str().to_string_lossy().into_owned();
        prefix = if prefix.is_empty() {
            part.clone()
        } else {
            format!("{prefix}/{part}")
        };
        crumbs.push(Crumb {
            name: part,
            href: format!("{}/", join_url(&root, &prefix)),
        });
    }
    crumbs
}

/// Apply the ordering policy to the directory's file listing.
///
/// The listing arrives alphabetical (BTreeMap order); time-based policies
/// are a stable sort on top, so equal timestamps keep the alphabetical
/// relative order. Indices are assigned after sorting: they are display
/// positions.
fn ordered_tiles(order: ImageOrder, record: &DirRecord) -> Vec<ImageTile> {
    let mut files: Vec<_> = record.files.values().collect();
    match order {
        ImageOrder::Alphabetical => {}
        ImageOrder::Newest => files.sort_by(|a, b| b.mod_time.cmp(&a.mod_time)),
        ImageOrder::Oldest => files.sort_by(|a, b| a.mod_time.cmp(&b.mod_time)),
    }
    files
        .into_iter()
        .enumerate()
        .map(|(i, f)| ImageTile {
            name: f.name.clone(),
            index: i + 1,
        })
        .collect()
}

/// Render the index document for a model.
pub fn render_index(model: &PageModel) -> Markup {
    let title = model
        .crumbs
        .last()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| model.gallery_name.clone());
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                link rel="stylesheet" href=(model.stylesheet);
                @if let Some(feed) = &model.feed {
                    link rel="alternate" type="application/rss+xml" title=(model.gallery_name) href=(feed);
                }
            }
            body {
                header.site-header {
                    nav.breadcrumb {
                        @for (i, crumb) in model.crumbs.iter().enumerate() {
                            @if i > 0 { " › " }
                            a href=(crumb.href) { (crumb.name) }
                        }
                    }
                }
                main.gallery {
                    @if !model.folders.is_empty() {
                        section.folders {
                            @for folder in &model.folders {
                                a.folder href={ (folder) "/" } {
                                    img.folder-icon src=(model.folder_icon) alt="";
                                    span.folder-name { (folder) }
                                }
                            }
                        }
                    }
                    @if !model.images.is_empty() {
                        section.images {
                            @for tile in &model.images {
                                a.image id=(tile.name) href={ "full_" (tile.name) } data-index=(tile.index) {
                                    img src={ "thumb_" (tile.name) } alt=(tile.name) loading="lazy";
                                }
                            }
                        }
                    }
                }
                footer.site-footer {
                    @if !model.copyright.is_empty() {
                        span.copyright { "© " (model.year) " " (model.copyright) }
                    }
                }
                script src=(model.script) {}
            }
        }
    }
}

/// Render and persist the index page for one directory record.
///
/// The output directory is created on demand; racing with image workers on
/// the same directory is fine, creation is a no-op on exists.
pub fn render_directory(config: &GalleryConfig, record: &DirRecord) -> Result<(), RenderError> {
    let out_dir = config.mirror_dir(&record.path);
    log::debug!("rendering index for {}", record.path.display());
    let model = PageModel::build(config, record);
    let markup = render_index(&model);
    fs::create_dir_all(&out_dir)?;
    fsutil::write_atomic(&out_dir.join("index.html"), markup.into_string().as_bytes())?;
    Ok(())
}
