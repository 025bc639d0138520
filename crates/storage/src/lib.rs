//! Storage layer: flat-file logs and helpers.
//!
//! Holds the newline-delimited line logs backing category assignments, the
//! atomic whole-file replacement they rely on, and the size-bounded error log.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub mod error_log;
pub mod line_log;

pub use error_log::ErrorLog;
pub use line_log::LineLog;

/// Replaces `path` with `data` so that readers observe either the old or the
/// new contents, never a partial write.
///
/// The data goes to a sibling temp file which is synced and then renamed over
/// the target. The parent directory is synced afterwards where the platform
/// allows opening directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    ensure_parent(path)?;
    let tmp = temp_sibling(path);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Some(dir) = path.parent() {
        if let Ok(dir_file) = fs::File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }
    Ok(())
}

pub fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}
