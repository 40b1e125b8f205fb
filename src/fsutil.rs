//! Small filesystem helpers shared by the pipeline stages.
//!
//! Every artifact write goes through [`write_atomic`] or [`copy_atomic`]:
//! bytes land in a dot-prefixed temp file next to the destination and are
//! renamed into place, so a reader of the output tree never observes a
//! half-written file under its final name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `bytes` to `path` via a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Copy `source` to `destination` via a temp file and rename.
pub fn copy_atomic(source: &Path, destination: &Path) -> io::Result<()> {
    let tmp = temp_sibling(destination);
    fs::copy(source, &tmp)?;
    fs::rename(&tmp, destination)
}
