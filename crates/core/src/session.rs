use crate::error::TriageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where the operator left off: the source being triaged and the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub source: String,
    pub index: usize,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(source: impl Into<String>, index: usize) -> Self {
        Self {
            source: source.into(),
            index,
            saved_at: Utc::now(),
        }
    }
}

/// JSON file holding the last [`SessionState`].
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved session. A missing or unreadable record is treated as
    /// no session at all.
    pub fn load(&self) -> Option<SessionState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("could not read session {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("ignoring corrupt session {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, state: &SessionState) -> Result<(), TriageError> {
        let failed = |source: io::Error| TriageError::PersistenceWriteFailed {
            what: "session",
            path: self.path.clone(),
            source,
        };
        let data = serde_json::to_vec_pretty(state)
            .map_err(|e| failed(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        storage::atomic_write(&self.path, &data).map_err(failed)?;
        debug!(source = %state.source, index = state.index, "session saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let file = SessionFile::new(temp.path().join("session.json"));
        assert!(file.load().is_none());

        let state = SessionState::new("/pics", 7);
        file.save(&state).unwrap();
        assert_eq!(file.load(), Some(state));
    }

    #[test]
    fn corrupt_record_reads_as_none() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("session.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(SessionFile::new(path).load().is_none());
    }

    #[test]
    fn record_without_timestamp_still_loads() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("session.json");
        fs::write(&path, r#"{"source":"/pics","index":3}"#).unwrap();
        let state = SessionFile::new(path).load().unwrap();
        assert_eq!(state.source, "/pics");
        assert_eq!(state.index, 3);
    }
}
