use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Append-only file of newline-delimited UTF-8 entries.
///
/// Appends go straight to the end of the file. Removals rewrite the whole
/// file through [`crate::atomic_write`].
#[derive(Debug, Clone)]
pub struct LineLog {
    path: PathBuf,
}

impl LineLog {
    /// Opens the log at `path`, creating an empty file if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        crate::ensure_parent(&path)?;
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every non-empty entry in file order. A missing file reads as empty.
    pub fn read_lines(&self) -> io::Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(content
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect())
    }

    pub fn append(&self, entry: &str) -> io::Result<()> {
        check_entry(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        Ok(())
    }

    /// Atomically replaces the log contents with `entries`.
    pub fn replace(&self, entries: &[String]) -> io::Result<()> {
        let mut buf = String::new();
        for entry in entries {
            check_entry(entry)?;
            buf.push_str(entry);
            buf.push('\n');
        }
        crate::atomic_write(&self.path, buf.as_bytes())?;
        tracing::debug!(path = %self.path.display(), entries = entries.len(), "log rewritten");
        Ok(())
    }

    /// Last modification time, or `None` if the file is missing.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

fn check_entry(entry: &str) -> io::Result<()> {
    if entry.is_empty() || entry.contains('\n') || entry.contains('\r') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("log entries must be a single non-empty line: {:?}", entry),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_replace() {
        let temp = tempfile::tempdir().unwrap();
        let log = LineLog::open(temp.path().join("selected.txt")).unwrap();
        assert!(log.read_lines().unwrap().is_empty());

        log.append("/pics/a.jpg").unwrap();
        log.append("/pics/b.jpg").unwrap();
        assert_eq!(log.read_lines().unwrap(), vec!["/pics/a.jpg", "/pics/b.jpg"]);

        log.replace(&["/pics/b.jpg".to_string()]).unwrap();
        assert_eq!(log.read_lines().unwrap(), vec!["/pics/b.jpg"]);
    }

    #[test]
    fn rejects_multiline_entries() {
        let temp = tempfile::tempdir().unwrap();
        let log = LineLog::open(temp.path().join("log.txt")).unwrap();
        let err = log.append("a\nb").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(log.read_lines().unwrap().is_empty());
    }

    #[test]
    fn reading_skips_blank_and_crlf_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("log.txt");
        fs::write(&path, "one\r\n\ntwo\n").unwrap();
        let log = LineLog::open(&path).unwrap();
        assert_eq!(log.read_lines().unwrap(), vec!["one", "two"]);
    }
}
