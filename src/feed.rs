//! RSS feed of recently added images.
//!
//! A single aggregator drains entries from a queue for the lifetime of the
//! build and finalizes once the queue closes — which the coordinator only
//! does after every image worker has drained, so the feed never references
//! an artifact that was not fully written.
//!
//! The feed is a best-effort artifact: malformed publish dates and write
//! failures are logged, never fatal.

use crate::config::{GalleryConfig, join_url};
use crate::fsutil;
use chrono::{DateTime, FixedOffset, Local, Utc};
use crossbeam_channel::Receiver;
use std::path::Path;
use std::time::SystemTime;

/// Maximum number of items kept in the feed, newest first.
pub const MAX_ITEMS: usize = 100;

const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// One syndication item representing a single processed image.
///
/// Created once, by an image worker (or reconstructed by the scanner from an
/// up-to-date thumbnail), then handed to the aggregator and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub description: String,
    pub link: String,
    pub guid: String,
    pub pub_date: String,
    pub enclosure: Enclosure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub length: u64,
    pub mime: String,
}

impl FeedEntry {
    /// Build the entry for an image whose thumbnail lives in the output
    /// directory mirroring source directory `source_dir`.
    ///
    /// `thumb_mtime`/`thumb_len` come from the written thumbnail: its write
    /// time is the item's publish date and its byte length fills the
    /// enclosure.
    pub fn for_thumbnail(
        config: &GalleryConfig,
        source_dir: &Path,
        name: &str,
        thumb_mtime: SystemTime,
        thumb_len: u64,
    ) -> Self {
        let base = config.public_dir_url(source_dir);
        let page_url = format!("{base}/#{name}");
        let thumb_url = join_url(&base, &format!("thumb_{name}"));
        Self {
            title: name.to_string(),
            description: format!("<img src=\"{thumb_url}\" alt=\"{name}\" />"),
            link: page_url.clone(),
            guid: page_url,
            pub_date: format_pub_date(thumb_mtime),
            enclosure: Enclosure {
                url: thumb_url,
                length: thumb_len,
                mime: "image/jpeg".to_string(),
            },
        }
    }
}

/// Format a timestamp as RFC 1123 with a numeric zone, in local time.
pub fn format_pub_date(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format(PUB_DATE_FORMAT).to_string()
}

fn parse_pub_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    match DateTime::parse_from_rfc2822(raw) {
        Ok(t) => Some(t),
        Err(e) => {
            log::warn!("unparseable feed pubDate {raw:?}: {e}");
            None
        }
    }
}

/// Drain the entry queue until all producers hang up, then finalize.
///
/// Returns whether a feed file was written. Runs on its own worker thread;
/// all failures are logged and swallowed.
pub fn aggregate(config: &GalleryConfig, entries: Receiver<FeedEntry>) -> bool {
    let collected: Vec<FeedEntry> = entries.iter().collect();
    if !config.rss_feed {
        log::debug!("feed generation disabled, dropping {} entries", collected.len());
        return false;
    }
    finalize(config, collected)
}

/// Sort, truncate, and persist the accumulated entries.
fn finalize(config: &GalleryConfig, entries: Vec<FeedEntry>) -> bool {
    if entries.is_empty() {
        log::debug!("no feed entries collected, skipping write");
        return false;
    }

    // Stable sort, newest first; unparseable dates sink to the end.
    let mut keyed: Vec<(Option<DateTime<FixedOffset>>, FeedEntry)> = entries
        .into_iter()
        .map(|e| (parse_pub_date(&e.pub_date), e))
        .collect();
    keyed.sort_by(|a, b| b.0.cmp(&a.0));

    let feed_file = config.output.join("rss.xml");

    // Skip the write when the existing feed is already newer than the newest
    // entry. A missing file or an unparseable newest date falls through to
    // the write.
    if let Some((Some(newest), _)) = keyed.first()
        && let Ok(meta) = std::fs::metadata(&feed_file)
        && let Ok(file_mtime) = meta.modified()
        && DateTime::<Utc>::from(file_mtime) > newest.with_timezone(&Utc)
    {
        log::debug!("feed file is up to date, skipping write");
        return false;
    }

    keyed.truncate(MAX_ITEMS);
    let items: Vec<FeedEntry> = keyed.into_iter().map(|(_, e)| e).collect();

    let xml = render_feed(config, &items);
    match fsutil::write_atomic(&feed_file, xml.as_bytes()) {
        Ok(()) => {
            log::info!("wrote feed with {} items to {}", items.len(), feed_file.display());
            true
        }
        Err(e) => {
            log::error!("failed to write feed {}: {e}", feed_file.display());
            false
        }
    }
}

/// Render the RSS 2.0 document.
fn render_feed(config: &GalleryConfig, items: &[FeedEntry]) -> String {
    let link = join_url(&config.gallery_url, &config.gallery_path);
    let self_link = join_url(&link, "rss.xml");
    let mut xml = String::with_capacity(1024 + items.len() * 512);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n");
    xml.push_str("  <channel>\n");
    xml.push_str(&format!("    <title>{}</title>\n", escape_xml(&config.name)));
    xml.push_str(&format!(
        "    <description>Latest images from {}</description>\n",
        escape_xml(&config.name)
    ));
    xml.push_str(&format!("    <link>{}</link>\n", escape_xml(&link)));
    xml.push_str("    <language>en-us</language>\n");
    if !config.copyright.is_empty() {
        xml.push_str(&format!(
            "    <copyright>{}</copyright>\n",
            escape_xml(&config.copyright)
        ));
    }
    xml.push_str(&format!(
        "    <atom:link href=\"{}\" rel=\"self\" type=\"application/rss+xml\" />\n",
        escape_xml(&self_link)
    ));
    xml.push_str(&format!(
        "    <lastBuildDate>{}</lastBuildDate>\n",
        format_pub_date(SystemTime::now())
    ));
    for item in items {
        xml.push_str("    <item>\n");
        xml.push_str(&format!("      <title>{}</title>\n", escape_xml(&item.title)));
        xml.push_str(&format!(
            "      <description>{}</description>\n",
            escape_xml(&item.description)
        ));
        xml.push_str(&format!("      <link>{}</link>\n", escape_xml(&item.link)));
        xml.push_str(&format!(
            "      <guid isPermaLink=\"false\">{}</guid>\n",
            escape_xml(&item.guid)
        ));
        xml.push_str(&format!(
            "      <pubDate>{}</pubDate>\n",
            escape_xml(&item.pub_date)
        ));
        xml.push_str(&format!(
            "      <enclosure url=\"{}\" length=\"{}\" type=\"{}\" />\n",
            escape_xml(&item.enclosure.url),
            item.enclosure.length,
            escape_xml(&item.enclosure.mime)
        ));
        xml.push_str("    </item>\n");
    }
    xml.push_str("  </channel>\n</rss>\n");
    xml
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn feed_config(tmp: &TempDir) -> GalleryConfig {
        GalleryConfig {
            name: "Test Gallery".to_string(),
            originals: tmp.path().join("originals"),
            output: tmp.path().join("output"),
            rss_feed: true,
            gallery_url: "https://example.com".to_string(),
            gallery_path: "/photos".to_string(),
            ..Default::default()
        }
    }

    fn entry_dated(name: &str, date: &str) -> FeedEntry {
        FeedEntry {
            title: name.to_string(),
            description: format!("<img src=\"thumb_{name}\" />"),
            link: format!("https://example.com/photos/#{name}"),
            guid: format!("https://example.com/photos/#{name}"),
            pub_date: date.to_string(),
            enclosure: Enclosure {
                url: format!("https://example.com/photos/thumb_{name}"),
                length: 1234,
                mime: "image/jpeg".to_string(),
            },
        }
    }

    #[test]
    fn entry_urls_built_from_config() {
        let tmp = TempDir::new().unwrap();
        let config = feed_config(&tmp);
        let dir = config.originals.join("2024");
        let entry = FeedEntry::for_thumbnail(&config, &dir, "dune.jpg", SystemTime::now(), 99);

        assert_eq!(entry.title, "dune.jpg");
        assert_eq!(entry.link, "https://example.com/photos/2024/#dune.jpg");
        assert_eq!(entry.guid, entry.link);
        assert_eq!(
            entry.enclosure.url,
            "https://example.com/photos/2024/thumb_dune.jpg"
        );
        assert_eq!(entry.enclosure.length, 99);
        assert_eq!(entry.enclosure.mime, "image/jpeg");
    }

    #[test]
    fn pub_date_round_trips() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let formatted = format_pub_date(t);
        let parsed = parse_pub_date(&formatted).unwrap();
        assert_eq!(
            parsed.with_timezone(&Utc),
            DateTime::<Utc>::from(t)
        );
    }

    #[test]
    fn finalize_sorts_newest_first() {
        let tmp = TempDir::new().unwrap();
        let config = feed_config(&tmp);
        std::fs::create_dir_all(&config.output).unwrap();

        let entries = vec![
            entry_dated("b.jpg", "Mon, 02 Jan 2023 10:00:00 +0000"),
            entry_dated("c.jpg", "Tue, 03 Jan 2023 10:00:00 +0000"),
            entry_dated("a.jpg", "Sun, 01 Jan 2023 10:00:00 +0000"),
        ];
        assert!(finalize(&config, entries));

        let xml = std::fs::read_to_string(config.output.join("rss.xml")).unwrap();
        let pos = |n: &str| xml.find(&format!("<title>{n}</title>")).unwrap();
        assert!(pos("c.jpg") < pos("b.jpg"));
        assert!(pos("b.jpg") < pos("a.jpg"));
    }

    #[test]
    fn finalize_caps_at_max_items() {
        let tmp = TempDir::new().unwrap();
        let config = feed_config(&tmp);
        std::fs::create_dir_all(&config.output).unwrap();

        let entries: Vec<FeedEntry> = (0..150)
            .map(|i| {
                entry_dated(
                    &format!("img{i:03}.jpg"),
                    &format_pub_date(SystemTime::UNIX_EPOCH + Duration::from_secs(i * 60)),
                )
            })
            .collect();
        assert!(finalize(&config, entries));

        let xml = std::fs::read_to_string(config.output.join("rss.xml")).unwrap();
        assert_eq!(xml.matches("<item>").count(), MAX_ITEMS);
        // Newest survives the cap, oldest does not.
        assert!(xml.contains("img149.jpg"));
        assert!(!xml.contains("img000.jpg"));
    }

    #[test]
    fn malformed_pub_date_sinks_to_end_and_never_fails() {
        let tmp = TempDir::new().unwrap();
        let config = feed_config(&tmp);
        std::fs::create_dir_all(&config.output).unwrap();

        let entries = vec![
            entry_dated("bad.jpg", "not a date"),
            entry_dated("good.jpg", "Tue, 03 Jan 2023 10:00:00 +0000"),
        ];
        assert!(finalize(&config, entries));

        let xml = std::fs::read_to_string(config.output.join("rss.xml")).unwrap();
        let good = xml.find("<title>good.jpg</title>").unwrap();
        let bad = xml.find("<title>bad.jpg</title>").unwrap();
        assert!(good < bad);
    }

    #[test]
    fn skip_write_when_feed_newer_than_newest_entry() {
        let tmp = TempDir::new().unwrap();
        let config = feed_config(&tmp);
        std::fs::create_dir_all(&config.output).unwrap();
        let feed_file = config.output.join("rss.xml");
        std::fs::write(&feed_file, "existing").unwrap();

        // Feed file mtime is "now"; the only entry is dated 2023.
        let entries = vec![entry_dated("a.jpg", "Sun, 01 Jan 2023 10:00:00 +0000")];
        assert!(!finalize(&config, entries));
        assert_eq!(std::fs::read_to_string(&feed_file).unwrap(), "existing");
    }

    #[test]
    fn empty_gallery_writes_no_feed() {
        let tmp = TempDir::new().unwrap();
        let config = feed_config(&tmp);
        std::fs::create_dir_all(&config.output).unwrap();

        assert!(!finalize(&config, Vec::new()));
        assert!(!config.output.join("rss.xml").exists());

        // An existing feed is left untouched too; zero entries must not
        // refresh lastBuildDate on every run.
        std::fs::write(config.output.join("rss.xml"), "existing").unwrap();
        assert!(!finalize(&config, Vec::new()));
        assert_eq!(
            std::fs::read_to_string(config.output.join("rss.xml")).unwrap(),
            "existing"
        );
    }

    #[test]
    fn aggregate_disabled_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = GalleryConfig {
            rss_feed: false,
            output: tmp.path().join("output"),
            originals: tmp.path().join("originals"),
            ..Default::default()
        };
        std::fs::create_dir_all(&config.output).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(entry_dated("a.jpg", "Sun, 01 Jan 2023 10:00:00 +0000"))
            .unwrap();
        drop(tx);

        assert!(!aggregate(&config, rx));
        assert!(!config.output.join("rss.xml").exists());
    }

    #[test]
    fn xml_is_escaped() {
        let tmp = TempDir::new().unwrap();
        let mut config = feed_config(&tmp);
        config.name = "Tom & Jerry <Pics>".to_string();
        let items = vec![entry_dated("a&b.jpg", "Sun, 01 Jan 2023 10:00:00 +0000")];
        let xml = render_feed(&config, &items);
        assert!(xml.contains("Tom &amp; Jerry &lt;Pics&gt;"));
        assert!(xml.contains("a&amp;b.jpg"));
        assert!(!xml.contains("<Pics>"));
    }

    #[test]
    fn public_root_dir_has_no_trailing_double_slash() {
        let tmp = TempDir::new().unwrap();
        let config = feed_config(&tmp);
        let entry = FeedEntry::for_thumbnail(
            &config,
            &PathBuf::from(&config.originals),
            "x.jpg",
            SystemTime::now(),
            1,
        );
        assert_eq!(entry.link, "https://example.com/photos/#x.jpg");
    }
}
