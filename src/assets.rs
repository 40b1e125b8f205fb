//! Static site assets: stylesheet, script, folder icon.
//!
//! The files are embedded at compile time and copied to the output root only
//! when absent, so user edits to the deployed copies survive rebuilds.

use crate::fsutil;
use std::io;
use std::path::Path;

const ASSETS: [(&str, &str); 3] = [
    ("gallery.css", include_str!("../static/gallery.css")),
    ("gallery.js", include_str!("../static/gallery.js")),
    ("folder.svg", include_str!("../static/folder.svg")),
];

/// Write each missing asset to the output root.
pub fn sync(output_root: &Path) -> io::Result<()> {
    for (name, content) in ASSETS {
        let target = output_root.join(name);
        if target.exists() {
            continue;
        }
        log::info!("installing asset {}", target.display());
        // Atomic like every other artifact: a crashed install must not
        // leave a truncated file that the absence check would then keep.
        fsutil::write_atomic(&target, content.as_bytes())?;
    }
    Ok(())
}
