use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Diagnostic log that grows by append and starts over once it passes
/// `max_bytes`.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
    max_bytes: u64,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `err` and its source chain, one cause per line.
    pub fn record(&self, err: &(dyn Error + 'static)) -> io::Result<()> {
        let mut lines = vec![err.to_string()];
        let mut source = err.source();
        while let Some(cause) = source {
            lines.push(format!("    caused by: {}", cause));
            source = cause.source();
        }
        self.append(&lines)
    }

    /// Like [`Self::record`], but a failed write only emits a warning.
    /// Returns whether the entry reached the file.
    pub fn record_or_warn(&self, err: &(dyn Error + 'static)) -> bool {
        match self.record(err) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("could not append to {}: {}", self.path.display(), e);
                false
            }
        }
    }

    pub fn append(&self, lines: &[String]) -> io::Result<()> {
        crate::ensure_parent(&self.path)?;
        let size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if size > self.max_bytes {
            fs::File::create(&self.path)?;
            tracing::debug!(path = %self.path.display(), size, "error log truncated");
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let stamp = chrono::Utc::now().to_rfc3339();
        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                writeln!(file, "{} {}", stamp, line)?;
            } else {
                writeln!(file, "{}", line)?;
            }
        }
        Ok(())
    }
}
