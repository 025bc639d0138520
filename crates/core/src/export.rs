//! Copies categorized items into `<root>/<Bucket>/<display name>`.

use crate::error::TriageError;
use crate::models::{content_path_of, display_name_of, Category, ExportRecord};
use crate::store::Snapshot;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use storage::ErrorLog;
use tracing::{debug, info, warn};

pub struct ExportJob {
    root: PathBuf,
    error_log: Option<ErrorLog>,
}

impl ExportJob {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            error_log: None,
        }
    }

    pub fn with_error_log(mut self, log: ErrorLog) -> Self {
        self.error_log = Some(log);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket(&self, category: Category) -> PathBuf {
        self.root.join(category.bucket_name())
    }

    /// Copies every item in `snapshot`, calling `on_progress(done, total)`
    /// after each attempt. Failures are counted per category and never stop
    /// the batch. Sources are left in place.
    pub fn run<F>(&self, snapshot: &Snapshot, mut on_progress: F) -> Vec<ExportRecord>
    where
        F: FnMut(usize, usize),
    {
        let total = snapshot.total();
        let mut done = 0usize;
        let mut records = Vec::with_capacity(Category::ALL.len());
        info!("Export of {} items into {} started.", total, self.root.display());

        for (category, ids) in snapshot.iter() {
            let bucket = self.bucket(category);
            let mut record = ExportRecord {
                category,
                destination: bucket.clone(),
                copied: 0,
                failed: 0,
                failures: Vec::new(),
            };
            for id in ids {
                match copy_item(id, &bucket) {
                    Ok(dest) => {
                        record.copied += 1;
                        debug!(item = %id, dest = %dest.display(), "copied");
                    }
                    Err(source) => {
                        warn!("copy of {} into {} failed: {}", id, bucket.display(), source);
                        let err = TriageError::ItemCopyFailed {
                            item: id.clone(),
                            category,
                            source,
                        };
                        if let Some(log) = &self.error_log {
                            log.record_or_warn(&err);
                        }
                        record.failed += 1;
                        record.failures.push(id.clone());
                    }
                }
                done += 1;
                on_progress(done, total);
            }
            info!(
                "Export {}: copied {}, failed {}.",
                category, record.copied, record.failed
            );
            records.push(record);
        }
        records
    }
}

/// Streams one item into `bucket`, creating the bucket if needed. A name
/// collision overwrites the earlier copy.
fn copy_item(id: &str, bucket: &Path) -> io::Result<PathBuf> {
    let src = content_path_of(id);
    let mut input = BufReader::new(fs::File::open(&src)?);
    fs::create_dir_all(bucket)?;
    let dest = bucket.join(display_name_of(id));
    if same_file(&src, &dest) {
        return Ok(dest);
    }
    let mut output = BufWriter::new(fs::File::create(&dest)?);
    io::copy(&mut input, &mut output)?;
    output.flush()?;
    Ok(dest)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
