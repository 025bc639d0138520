use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Yes,
    No,
    NotSure,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Yes, Category::No, Category::NotSure];

    /// File name of the category log inside the storage root.
    pub fn log_file_name(self) -> &'static str {
        match self {
            Category::Yes => "selected.txt",
            Category::No => "not_selected.txt",
            Category::NotSure => "not_sure.txt",
        }
    }

    /// Directory name of the export bucket.
    pub fn bucket_name(self) -> &'static str {
        match self {
            Category::Yes => "Yes",
            Category::No => "No",
            Category::NotSure => "NotSure",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Yes => "Yes",
            Category::No => "No",
            Category::NotSure => "Not Sure",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            Category::Yes => 0,
            Category::No => 1,
            Category::NotSure => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A unit of content to triage. Identity is the identifier string.
#[derive(Debug, Clone)]
pub struct Item {
    id: String,
    display_name: OnceLock<String>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Final path segment of the identifier, resolved on first use.
    pub fn display_name(&self) -> &str {
        self.display_name.get_or_init(|| display_name_of(&self.id))
    }

    pub fn content_path(&self) -> PathBuf {
        content_path_of(&self.id)
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Item {}

/// Filesystem location behind an identifier. `file://` URIs are accepted.
pub fn content_path_of(id: &str) -> PathBuf {
    PathBuf::from(id.strip_prefix("file://").unwrap_or(id))
}

pub fn display_name_of(id: &str) -> String {
    let path = content_path_of(id);
    Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.to_string())
}

/// Cursor movement result. The boundary cases are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Step {
    Moved(usize),
    NoMoreItems,
    AlreadyAtStart,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    pub category: Category,
    pub destination: PathBuf,
    pub copied: usize,
    pub failed: usize,
    pub failures: Vec<String>,
}
