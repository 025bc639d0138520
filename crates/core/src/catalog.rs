//! Discovers triage items in a source directory and holds the cursor over them.

use crate::config::ScanConfig;
use crate::error::TriageError;
use crate::models::{Item, Step};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::io;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Enumerates the immediate children of `source` that are files of an
/// accepted media kind, ordered by file name.
pub fn scan(source: &str, opts: &ScanConfig) -> Result<Vec<Item>, TriageError> {
    let root = crate::models::content_path_of(source);
    let unavailable = |e: io::Error| TriageError::SourceUnavailable {
        source_location: source.to_string(),
        source: e,
    };
    let meta = std::fs::metadata(&root).map_err(unavailable)?;
    if !meta.is_dir() {
        return Err(unavailable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }
    let exclude_set = build_globset(&opts.exclude).map_err(|e| {
        unavailable(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
    })?;

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                // The root itself failing to list means the source is gone;
                // a single unreadable child is just skipped.
                if e.depth() == 0 {
                    return Err(unavailable(e.into()));
                }
                debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if (!opts.include_hidden && is_hidden(path)) || exclude_set.is_match(path) {
            continue;
        }
        let Some(mime) = media_kind(path) else {
            continue;
        };
        if !opts.accept.iter().any(|prefix| mime.starts_with(prefix.as_str())) {
            continue;
        }
        // Ids live one per line in UTF-8 logs and must map back to the file.
        let Some(id) = path.to_str() else {
            debug!("skipping non UTF-8 name: {}", path.display());
            continue;
        };
        if id.contains(['\n', '\r']) {
            debug!("skipping name with a line break: {:?}", id);
            continue;
        }
        if seen.insert(id.to_string()) {
            items.push(Item::new(id));
        }
    }
    info!("Scan of {} found {} items.", source, items.len());
    Ok(items)
}

/// Guesses the MIME type from the extension, falling back to content sniffing
/// for unknown extensions.
pub fn media_kind(path: &Path) -> Option<String> {
    if let Some(mime) = guess_mime(path) {
        return Some(mime.to_string());
    }
    infer::get_from_path(path)
        .ok()
        .flatten()
        .map(|kind| kind.mime_type().to_string())
}

fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => return None,
    };
    Some(mime)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat)?);
    }
    builder.build()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Ordered items plus the cursor. The cursor is always a valid index, or 0
/// when the catalog is empty.
#[derive(Debug, Default)]
pub struct ItemCatalog {
    items: Vec<Item>,
    cursor: usize,
}

impl ItemCatalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items, cursor: 0 }
    }

    /// Replaces the sequence wholesale and resets the cursor to 0.
    pub fn replace(&mut self, items: Vec<Item>) {
        self.items = items;
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&Item> {
        self.items.get(self.cursor)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id() == id)
    }

    /// Moves the cursor to `index`, clamped into range. Returns the new cursor.
    pub fn cursor_at(&mut self, index: usize) -> usize {
        self.cursor = index.min(self.items.len().saturating_sub(1));
        self.cursor
    }

    pub fn advance(&mut self) -> Step {
        if self.cursor + 1 < self.items.len() {
            self.cursor += 1;
            Step::Moved(self.cursor)
        } else {
            Step::NoMoreItems
        }
    }

    pub fn retreat(&mut self) -> Step {
        if self.cursor > 0 {
            self.cursor -= 1;
            Step::Moved(self.cursor)
        } else {
            Step::AlreadyAtStart
        }
    }
}
