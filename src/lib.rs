//! # fotogal
//!
//! An incremental static photo gallery generator. Point it at a tree of
//! JPEG files and it mirrors that tree into a browsable site: a thumbnail
//! and a bounded full-size copy per image, an index page per directory, and
//! optionally an RSS feed of recent additions.
//!
//! Builds are incremental by modification time: a second run over an
//! unchanged tree writes nothing. Staleness never relies on a manifest or
//! database — the output tree itself is the record of the previous build.
//!
//! ## Module Map
//!
//! | Module     | Role                                                    |
//! |------------|---------------------------------------------------------|
//! | [config]   | `gallery.toml` loading, validation, path/URL helpers     |
//! | [scan]     | source tree walk, gallery index, stale-image dispatch    |
//! | [stale]    | output snapshot and mtime-based staleness decisions      |
//! | [process]  | JPEG transcoding into thumbnail and full-size artifacts  |
//! | [render]   | per-directory index pages (maud)                         |
//! | [feed]     | RSS 2.0 feed aggregation and finalization                |
//! | [pipeline] | worker pools, channels, two-phase shutdown               |
//! | [assets]   | embedded stylesheet/script/icon, installed when absent   |
//! | [fsutil]   | atomic file writes                                       |
//!
//! ## Design Notes
//!
//! - All artifact writes go through a temp-file-and-rename, so a crashed or
//!   aborted build never leaves a half-written file that a later run would
//!   mistake for a finished one.
//! - Worker pools communicate only through channels; closing a channel is
//!   the shutdown signal. The feed aggregator is closed last, after the
//!   image pool drains, so the feed only ever describes finished artifacts.
//! - A fatal error in any worker flags a shared abort and fails the build;
//!   the feed, by contrast, is best-effort and never fails a build.

pub mod assets;
pub mod config;
pub mod feed;
pub mod fsutil;
pub mod pipeline;
pub mod process;
pub mod render;
pub mod scan;
pub mod stale;
