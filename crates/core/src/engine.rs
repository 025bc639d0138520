//! Triage state machine over the catalog and the category store.
//!
//! `Idle -> Scanning -> Ready | Empty`, `Ready -> Ready` on navigation and
//! categorization, and any settled state `-> Draining -> Idle` on export.
//! Commands that arrive while `Scanning` or `Draining` fail with
//! [`TriageError::EngineBusy`].

use crate::catalog::{self, ItemCatalog};
use crate::config::AppConfig;
use crate::error::TriageError;
use crate::export::ExportJob;
use crate::models::{Category, ExportRecord, Item, Step};
use crate::session::{SessionFile, SessionState};
use crate::store::{CategoryStore, Snapshot};
use serde::Serialize;
use storage::ErrorLog;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    Scanning,
    Ready,
    Empty,
    Draining,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub source: String,
    pub total: usize,
    pub cursor: usize,
    pub state: EngineState,
}

#[derive(Debug)]
pub struct Categorized {
    pub item: String,
    pub category: Category,
    /// `Step::NoMoreItems` when the decided item was the last one.
    pub step: Step,
    /// Set when the decision is only held in memory.
    pub write_error: Option<TriageError>,
}

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub records: Vec<ExportRecord>,
    pub write_errors: Vec<TriageError>,
}

impl ExportSummary {
    pub fn copied(&self) -> usize {
        self.records.iter().map(|r| r.copied).sum()
    }

    pub fn failed(&self) -> usize {
        self.records.iter().map(|r| r.failed).sum()
    }
}

pub struct TriageEngine {
    config: AppConfig,
    catalog: ItemCatalog,
    store: CategoryStore,
    session: SessionFile,
    error_log: ErrorLog,
    source: Option<String>,
    state: EngineState,
    resume_failure: Option<TriageError>,
}

impl TriageEngine {
    /// Loads the category store under the configured storage root. The engine
    /// starts `Idle`.
    pub fn open(config: AppConfig) -> Result<Self, TriageError> {
        let root = config.storage_root();
        let error_log = ErrorLog::new(config.error_log_path(), config.error_log.max_bytes);
        let store = match CategoryStore::open(&root) {
            Ok(store) => store,
            Err(e) => {
                error_log.record_or_warn(&e);
                return Err(e);
            }
        };
        let session = SessionFile::new(config.session_path());
        Ok(Self {
            config,
            catalog: ItemCatalog::default(),
            store,
            session,
            error_log,
            source: None,
            state: EngineState::Idle,
            resume_failure: None,
        })
    }

    /// Opens the engine and, if a session was saved, rescans its source and
    /// restores the cursor clamped to the new catalog. A source that is gone
    /// leaves the engine `Idle` and is kept in [`Self::resume_failure`].
    pub fn resume(config: AppConfig) -> Result<Self, TriageError> {
        let mut engine = Self::open(config)?;
        if let Some(saved) = engine.saved_session() {
            engine.begin_scan()?;
            let result = catalog::scan(&saved.source, &engine.config.scan);
            if let Err(e) = engine.finish_scan(&saved.source, result, Some(saved.index)) {
                warn!("could not resume session on {}: {}", saved.source, e);
                engine.resume_failure = Some(e);
            }
        }
        Ok(engine)
    }

    /// Why [`Self::resume`] could not reload the saved source, if it failed.
    pub fn resume_failure(&self) -> Option<&TriageError> {
        self.resume_failure.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn store(&self) -> &CategoryStore {
        &self.store
    }

    pub fn items(&self) -> &[Item] {
        self.catalog.items()
    }

    pub fn saved_session(&self) -> Option<SessionState> {
        self.session.load()
    }

    /// Fails with `EngineBusy` while a scan or export is outstanding.
    pub fn ensure_available(&self) -> Result<(), TriageError> {
        match self.state {
            EngineState::Scanning => Err(TriageError::EngineBusy("scan")),
            EngineState::Draining => Err(TriageError::EngineBusy("export")),
            _ => Ok(()),
        }
    }

    /// Scans `source` on the calling thread.
    pub fn scan(&mut self, source: &str) -> Result<ScanSummary, TriageError> {
        self.begin_scan()?;
        let result = catalog::scan(source, &self.config.scan);
        self.finish_scan(source, result, None)
    }

    pub fn begin_scan(&mut self) -> Result<(), TriageError> {
        self.ensure_available()?;
        self.state = EngineState::Scanning;
        Ok(())
    }

    /// Installs the outcome of a scan started with [`Self::begin_scan`].
    ///
    /// With `resume_index` the cursor is restored to it (clamped). Otherwise
    /// a rescan of the same source stays on the current item, and a new
    /// source starts on the most recently decided item if it is present.
    pub fn finish_scan(
        &mut self,
        source: &str,
        result: Result<Vec<Item>, TriageError>,
        resume_index: Option<usize>,
    ) -> Result<ScanSummary, TriageError> {
        let items = match result {
            Ok(items) => items,
            Err(e) => {
                self.catalog.clear();
                self.source = None;
                self.state = EngineState::Idle;
                self.record_failure(&e);
                return Err(e);
            }
        };

        let keep = match (&self.source, self.catalog.current()) {
            (Some(prev), Some(item)) if prev == source => Some(item.id().to_string()),
            _ => None,
        };
        self.catalog.replace(items);
        let cursor = match resume_index {
            Some(index) => index,
            None => keep
                .as_deref()
                .or(self.store.latest())
                .and_then(|id| self.catalog.position_of(id))
                .unwrap_or(0),
        };
        let cursor = self.catalog.cursor_at(cursor);
        self.source = Some(source.to_string());
        self.state = if self.catalog.is_empty() {
            EngineState::Empty
        } else {
            EngineState::Ready
        };
        info!(
            "Catalog ready: {} items from {}, cursor at {}.",
            self.catalog.len(),
            source,
            cursor
        );
        Ok(ScanSummary {
            source: source.to_string(),
            total: self.catalog.len(),
            cursor,
            state: self.state,
        })
    }

    pub fn next(&mut self) -> Result<Step, TriageError> {
        self.ensure_loaded()?;
        let step = self.catalog.advance();
        debug!(?step, "next");
        Ok(step)
    }

    pub fn previous(&mut self) -> Result<Step, TriageError> {
        self.ensure_loaded()?;
        let step = self.catalog.retreat();
        debug!(?step, "previous");
        Ok(step)
    }

    /// Assigns `category` to the current item and advances. At the last item
    /// the cursor stays put and the step is `NoMoreItems`.
    pub fn categorize(&mut self, category: Category) -> Result<Categorized, TriageError> {
        self.ensure_loaded()?;
        let item = self
            .catalog
            .current()
            .map(|i| i.id().to_string())
            .ok_or(TriageError::NoCurrentItem)?;
        let write_error = match self.store.assign(&item, category) {
            Ok(()) => None,
            Err(e) => {
                self.record_failure(&e);
                Some(e)
            }
        };
        let step = self.catalog.advance();
        if step == Step::NoMoreItems {
            info!("Collection exhausted at item {}.", self.catalog.cursor() + 1);
        }
        Ok(Categorized {
            item,
            category,
            step,
            write_error,
        })
    }

    pub fn current_item(&self) -> Option<&Item> {
        match self.state {
            EngineState::Idle | EngineState::Scanning => None,
            _ => self.catalog.current(),
        }
    }

    /// Zero-based cursor and catalog size.
    pub fn progress(&self) -> (usize, usize) {
        (self.catalog.cursor(), self.catalog.len())
    }

    pub fn selected_count(&self) -> usize {
        self.store.count(Category::Yes)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn export_job(&self) -> ExportJob {
        ExportJob::new(self.config.export_root()).with_error_log(self.error_log.clone())
    }

    /// Enters `Draining` and hands out the snapshot to export.
    pub fn begin_export(&mut self) -> Result<Snapshot, TriageError> {
        self.ensure_available()?;
        self.state = EngineState::Draining;
        Ok(self.store.snapshot())
    }

    /// Writes the summary log and the session, then returns to `Idle`
    /// whatever the per-item outcome was.
    pub fn finish_export(&mut self, records: Vec<ExportRecord>) -> ExportSummary {
        let mut write_errors = Vec::new();
        if let Err(e) = self.write_summary_log() {
            self.record_failure(&e);
            write_errors.push(e);
        }
        if let Err(e) = self.checkpoint() {
            write_errors.push(e);
        }
        self.catalog.clear();
        self.source = None;
        self.state = EngineState::Idle;
        let summary = ExportSummary {
            records,
            write_errors,
        };
        info!(
            "Export finished: copied {}, failed {}.",
            summary.copied(),
            summary.failed()
        );
        summary
    }

    /// Runs the whole export on the calling thread.
    pub fn export_and_close<F>(&mut self, on_progress: F) -> Result<ExportSummary, TriageError>
    where
        F: FnMut(usize, usize),
    {
        let snapshot = self.begin_export()?;
        let records = self.export_job().run(&snapshot, on_progress);
        Ok(self.finish_export(records))
    }

    /// Persists the source and cursor. Without a loaded source there is
    /// nothing to save.
    pub fn checkpoint(&self) -> Result<(), TriageError> {
        let Some(source) = &self.source else {
            debug!("no source loaded; skipping session save");
            return Ok(());
        };
        let state = SessionState::new(source.clone(), self.catalog.cursor());
        self.session.save(&state).map_err(|e| {
            self.record_failure(&e);
            e
        })
    }

    pub fn shutdown(self) -> Result<(), TriageError> {
        self.checkpoint()
    }

    fn ensure_loaded(&self) -> Result<(), TriageError> {
        self.ensure_available()?;
        match self.state {
            EngineState::Ready | EngineState::Empty => Ok(()),
            _ => Err(TriageError::NoCurrentItem),
        }
    }

    fn write_summary_log(&self) -> Result<(), TriageError> {
        let snapshot = self.store.snapshot();
        let mut out = String::new();
        for (category, ids) in snapshot.iter() {
            out.push_str(&format!("{}: [{}]\n", category.label(), ids.join(", ")));
        }
        let path = self.config.summary_log_path();
        storage::atomic_write(&path, out.as_bytes()).map_err(|source| {
            TriageError::PersistenceWriteFailed {
                what: "summary log",
                path,
                source,
            }
        })
    }

    fn record_failure(&self, err: &TriageError) {
        warn!("{}", err);
        self.error_log.record_or_warn(err);
    }
}
