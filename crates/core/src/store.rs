//! Durable item -> category mapping backed by one line log per category.
//!
//! A reassignment appends to the target log first and only then rewrites the
//! log being retracted from, so a crash in between leaves the item in two logs
//! rather than in none. [`CategoryStore::open`] repairs that state: the copy in
//! the most recently modified log wins and the others are rewritten.

use crate::error::TriageError;
use crate::models::Category;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::time::SystemTime;
use storage::LineLog;
use tracing::{debug, info, warn};

/// Point-in-time copy of all three partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    partitions: [Vec<String>; 3],
}

impl Snapshot {
    pub fn get(&self, category: Category) -> &[String] {
        &self.partitions[category.slot()]
    }

    pub fn total(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        Category::ALL
            .into_iter()
            .map(move |c| (c, self.partitions[c.slot()].as_slice()))
    }
}

/// What the load-time consistency pass had to fix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Identifiers found in more than one log, with the category kept.
    pub repaired: Vec<(String, Category)>,
    /// Duplicate lines dropped inside a single log.
    pub duplicates_dropped: usize,
}

pub struct CategoryStore {
    logs: [LineLog; 3],
    entries: [Vec<String>; 3],
    index: HashMap<String, Category>,
    latest: Option<String>,
    report: LoadReport,
    /// Logs whose file lags behind memory after a failed write. The next
    /// write to one of them rewrites it whole instead of appending.
    stale: [bool; 3],
}

impl CategoryStore {
    /// Opens (creating if needed) the three logs under `root`, rebuilds the
    /// reverse index and repairs any cross-log duplicates.
    pub fn open(root: &Path) -> Result<Self, TriageError> {
        let open = |c: Category| {
            let path = root.join(c.log_file_name());
            LineLog::open(&path).map_err(|source| TriageError::LoadFailed {
                what: "category log",
                path,
                source,
            })
        };
        let logs = [
            open(Category::Yes)?,
            open(Category::No)?,
            open(Category::NotSure)?,
        ];

        let mut entries: [Vec<String>; 3] = Default::default();
        let mut mtimes: [Option<SystemTime>; 3] = [None; 3];
        let mut dirty = [false; 3];
        let mut report = LoadReport::default();

        for c in Category::ALL {
            let log = &logs[c.slot()];
            let lines = log.read_lines().map_err(|source| TriageError::LoadFailed {
                what: "category log",
                path: log.path().to_path_buf(),
                source,
            })?;
            let read = lines.len();
            let deduped = dedup_keep_last(lines);
            if deduped.len() != read {
                report.duplicates_dropped += read - deduped.len();
                dirty[c.slot()] = true;
            }
            entries[c.slot()] = deduped;
            mtimes[c.slot()] = log.modified();
        }

        let mut homes: HashMap<&str, Vec<Category>> = HashMap::new();
        for c in Category::ALL {
            for id in &entries[c.slot()] {
                homes.entry(id.as_str()).or_default().push(c);
            }
        }
        let mut conflicts: Vec<(String, Category, Vec<Category>)> = homes
            .into_iter()
            .filter(|(_, cats)| cats.len() > 1)
            .map(|(id, cats)| {
                let keep = pick_winner(id, &cats, &mtimes, &entries);
                let losers = cats.into_iter().filter(|c| *c != keep).collect();
                (id.to_string(), keep, losers)
            })
            .collect();
        conflicts.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, keep, losers) in conflicts {
            warn!(
                "{} found in {} logs; keeping it in {} and retracting it elsewhere",
                id,
                losers.len() + 1,
                keep
            );
            for c in losers {
                entries[c.slot()].retain(|e| e != &id);
                dirty[c.slot()] = true;
            }
            report.repaired.push((id, keep));
        }

        for c in Category::ALL {
            if dirty[c.slot()] {
                if let Err(e) = logs[c.slot()].replace(&entries[c.slot()]) {
                    // The in-memory repair still holds; the next load repeats it.
                    warn!("could not rewrite {} during repair: {}", c.log_file_name(), e);
                }
            }
        }

        let mut index = HashMap::new();
        for c in Category::ALL {
            for id in &entries[c.slot()] {
                index.insert(id.clone(), c);
            }
        }

        let latest = Category::ALL
            .into_iter()
            .filter(|c| !entries[c.slot()].is_empty())
            .max_by_key(|c| mtimes[c.slot()])
            .and_then(|c| entries[c.slot()].last().cloned());

        info!(
            "Category store loaded: yes={}, no={}, not_sure={}",
            entries[0].len(),
            entries[1].len(),
            entries[2].len()
        );

        Ok(Self {
            logs,
            entries,
            index,
            latest,
            report,
            stale: [false; 3],
        })
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// Records `category` for `id`, retracting any earlier assignment.
    ///
    /// The in-memory state is updated even when the durable write fails; the
    /// returned error then means the logs may lag behind.
    pub fn assign(&mut self, id: &str, category: Category) -> Result<(), TriageError> {
        let previous = self.index.get(id).copied();
        if let Some(prev) = previous {
            self.entries[prev.slot()].retain(|e| e != id);
        }
        self.entries[category.slot()].push(id.to_string());
        self.index.insert(id.to_string(), category);
        self.latest = Some(id.to_string());
        debug!(item = id, from = ?previous, to = %category, "assigned");

        if self.stale[category.slot()] {
            self.rewrite(category)?;
        } else if let Err(e) = self.logs[category.slot()].append(id) {
            self.stale[category.slot()] = true;
            return Err(self.write_failed(category, e));
        }
        if let Some(prev) = previous {
            self.rewrite(prev)?;
        }
        Ok(())
    }

    /// Removes any live assignment for `id`. Returns whether one existed.
    pub fn retract(&mut self, id: &str) -> Result<bool, TriageError> {
        let Some(prev) = self.index.remove(id) else {
            return Ok(false);
        };
        self.entries[prev.slot()].retain(|e| e != id);
        if self.latest.as_deref() == Some(id) {
            self.latest = None;
        }
        self.rewrite(prev)?;
        Ok(true)
    }

    pub fn category_of(&self, id: &str) -> Option<Category> {
        self.index.get(id).copied()
    }

    pub fn count(&self, category: Category) -> usize {
        self.entries[category.slot()].len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Most recently decided identifier, if any.
    pub fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            partitions: self.entries.clone(),
        }
    }

    fn rewrite(&mut self, category: Category) -> Result<(), TriageError> {
        let slot = category.slot();
        match self.logs[slot].replace(&self.entries[slot]) {
            Ok(()) => {
                self.stale[slot] = false;
                Ok(())
            }
            Err(e) => {
                self.stale[slot] = true;
                Err(self.write_failed(category, e))
            }
        }
    }

    fn write_failed(&self, category: Category, source: io::Error) -> TriageError {
        let path = self.logs[category.slot()].path().to_path_buf();
        warn!("write to {} failed: {}", path.display(), source);
        TriageError::PersistenceWriteFailed {
            what: "category log",
            path,
            source,
        }
    }
}

fn dedup_keep_last(lines: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut kept: Vec<String> = lines
        .into_iter()
        .rev()
        .filter(|l| seen.insert(l.clone()))
        .collect();
    kept.reverse();
    kept
}

/// Most recently modified log wins. On equal timestamps the log that has the
/// id as its final line wins, since the pending append lands at the tail.
fn pick_winner(
    id: &str,
    candidates: &[Category],
    mtimes: &[Option<SystemTime>; 3],
    entries: &[Vec<String>; 3],
) -> Category {
    let mut best = candidates[0];
    for &c in &candidates[1..] {
        let newer = mtimes[c.slot()] > mtimes[best.slot()];
        let tie = mtimes[c.slot()] == mtimes[best.slot()];
        let at_tail = |cat: Category| entries[cat.slot()].last().map(String::as_str) == Some(id);
        if newer || (tie && at_tail(c) && !at_tail(best)) {
            best = c;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn reassignment_leaves_exactly_one_category() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = CategoryStore::open(temp.path()).unwrap();

        let sequence = [
            Category::Yes,
            Category::No,
            Category::NotSure,
            Category::Yes,
            Category::Yes,
            Category::No,
        ];
        for c in sequence {
            store.assign("/pics/a.jpg", c).unwrap();
        }
        store.assign("/pics/b.jpg", Category::NotSure).unwrap();

        assert_eq!(store.category_of("/pics/a.jpg"), Some(Category::No));
        let snap = store.snapshot();
        let holders: Vec<Category> = snap
            .iter()
            .filter(|(_, ids)| ids.iter().any(|i| i == "/pics/a.jpg"))
            .map(|(c, _)| c)
            .collect();
        assert_eq!(holders, vec![Category::No]);
        assert_eq!(snap.total(), 2);

        let reloaded = CategoryStore::open(temp.path()).unwrap();
        assert_eq!(reloaded.snapshot(), snap);
        assert!(reloaded.load_report().repaired.is_empty());
    }

    #[test]
    fn yes_then_no_moves_the_item() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = CategoryStore::open(temp.path()).unwrap();
        store.assign("id", Category::Yes).unwrap();
        store.assign("id", Category::No).unwrap();

        assert_eq!(store.category_of("id"), Some(Category::No));
        assert!(store.snapshot().get(Category::Yes).is_empty());
        let yes_file = fs::read_to_string(temp.path().join("selected.txt")).unwrap();
        assert!(!yes_file.contains("id"));
        let no_file = fs::read_to_string(temp.path().join("not_selected.txt")).unwrap();
        assert_eq!(no_file, "id\n");
    }

    #[test]
    fn retract_is_a_noop_for_unknown_items() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = CategoryStore::open(temp.path()).unwrap();
        assert!(!store.retract("nothing").unwrap());

        store.assign("x", Category::NotSure).unwrap();
        assert!(store.retract("x").unwrap());
        assert_eq!(store.category_of("x"), None);
        assert!(CategoryStore::open(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn reload_repairs_item_left_in_two_logs() {
        let temp = tempfile::tempdir().unwrap();
        let yes = temp.path().join("selected.txt");
        let no = temp.path().join("not_selected.txt");
        // Crash after the append to No, before Yes was rewritten.
        fs::write(&yes, "a\nx\n").unwrap();
        fs::write(&no, "b\nx\n").unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&yes, base);
        set_mtime(&no, base + Duration::from_secs(10));

        let store = CategoryStore::open(temp.path()).unwrap();

        assert_eq!(store.category_of("x"), Some(Category::No));
        assert_eq!(store.snapshot().get(Category::Yes), ["a".to_string()]);
        assert_eq!(
            store.load_report().repaired,
            vec![("x".to_string(), Category::No)]
        );
        assert_eq!(fs::read_to_string(&yes).unwrap(), "a\n");
        assert_eq!(store.latest(), Some("x"));

        let again = CategoryStore::open(temp.path()).unwrap();
        assert!(again.load_report().repaired.is_empty());
        assert_eq!(again.snapshot(), store.snapshot());
    }

    #[test]
    fn equal_timestamps_prefer_the_log_with_the_item_at_its_tail() {
        let temp = tempfile::tempdir().unwrap();
        let yes = temp.path().join("selected.txt");
        let unsure = temp.path().join("not_sure.txt");
        fs::write(&yes, "x\na\n").unwrap();
        fs::write(&unsure, "b\nx\n").unwrap();
        let when = SystemTime::now() - Duration::from_secs(60);
        set_mtime(&yes, when);
        set_mtime(&unsure, when);

        let store = CategoryStore::open(temp.path()).unwrap();
        assert_eq!(store.category_of("x"), Some(Category::NotSure));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn duplicate_lines_within_a_log_collapse_to_the_last() {
        let temp = tempfile::tempdir().unwrap();
        let yes = temp.path().join("selected.txt");
        fs::write(&yes, "x\na\nx\n").unwrap();

        let store = CategoryStore::open(temp.path()).unwrap();
        assert_eq!(
            store.snapshot().get(Category::Yes),
            ["a".to_string(), "x".to_string()]
        );
        assert_eq!(store.load_report().duplicates_dropped, 1);
        assert_eq!(fs::read_to_string(&yes).unwrap(), "a\nx\n");
    }

    #[test]
    fn write_failure_still_updates_memory() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = CategoryStore::open(temp.path()).unwrap();
        let yes = temp.path().join("selected.txt");
        fs::remove_file(&yes).unwrap();
        fs::create_dir(&yes).unwrap();

        let err = store.assign("a", Category::Yes).unwrap_err();
        assert!(err.is_degraded_durability());
        assert_eq!(store.category_of("a"), Some(Category::Yes));
        assert_eq!(store.count(Category::Yes), 1);

        store.assign("b", Category::No).unwrap();
        assert_eq!(store.count(Category::No), 1);
    }

    #[test]
    fn failed_append_keeps_the_old_durable_assignment() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = CategoryStore::open(temp.path()).unwrap();
        store.assign("a", Category::No).unwrap();
        let yes = temp.path().join("selected.txt");
        fs::remove_file(&yes).unwrap();
        fs::create_dir(&yes).unwrap();

        assert!(store.assign("a", Category::Yes).is_err());
        assert_eq!(store.category_of("a"), Some(Category::Yes));
        let no_file = fs::read_to_string(temp.path().join("not_selected.txt")).unwrap();
        assert_eq!(no_file, "a\n");
    }

    #[test]
    fn log_left_behind_by_a_failed_retract_is_rewritten_on_next_write() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = CategoryStore::open(temp.path()).unwrap();
        store.assign("a", Category::No).unwrap();
        let blocker = temp.path().join(".not_selected.txt.tmp");
        fs::create_dir(&blocker).unwrap();

        assert!(store.assign("a", Category::Yes).is_err());
        let no_path = temp.path().join("not_selected.txt");
        assert_eq!(fs::read_to_string(&no_path).unwrap(), "a\n");

        fs::remove_dir(&blocker).unwrap();
        store.assign("b", Category::No).unwrap();
        assert_eq!(fs::read_to_string(&no_path).unwrap(), "b\n");

        let reloaded = CategoryStore::open(temp.path()).unwrap();
        assert_eq!(reloaded.category_of("a"), Some(Category::Yes));
        assert_eq!(reloaded.category_of("b"), Some(Category::No));
        assert!(reloaded.load_report().repaired.is_empty());
    }
}
