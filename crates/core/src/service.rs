//! Single owner task for a [`TriageEngine`].
//!
//! Commands reach the engine through an [`EngineHandle`] and are applied one
//! at a time. Scans and exports run on the blocking pool; while one is in
//! flight the owner keeps answering reads and rejects mutating commands with
//! `EngineBusy`. Export progress is forwarded from the owner task as
//! [`EngineEvent`]s.

use crate::catalog;
use crate::command::Command;
use crate::engine::{Categorized, EngineState, ExportSummary, ScanSummary, TriageEngine};
use crate::error::TriageError;
use crate::models::{Item, Step};
use crate::store::Snapshot;
use std::io;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

const REQUEST_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ScanFinished { source: String, total: usize },
    ExportProgress { done: usize, total: usize },
    ExportFinished { copied: usize, failed: usize },
}

#[derive(Debug)]
pub enum Reply {
    Scanned(ScanSummary),
    Moved(Step),
    Categorized(Categorized),
    Exported(ExportSummary),
}

type Respond<T> = oneshot::Sender<Result<T, TriageError>>;

enum Request {
    Command(Command, Respond<Reply>),
    Resume(Respond<Option<ScanSummary>>),
    CurrentItem(oneshot::Sender<Option<Item>>),
    Progress(oneshot::Sender<(usize, usize)>),
    SelectedCount(oneshot::Sender<usize>),
    State(oneshot::Sender<EngineState>),
    Snapshot(oneshot::Sender<Snapshot>),
    Checkpoint(Respond<()>),
    Shutdown(Respond<()>),
}

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Request>,
}

/// Moves `engine` onto its own task. The returned receiver carries progress
/// events; the join handle completes after [`EngineHandle::shutdown`] or
/// once every handle is dropped.
pub fn spawn(
    engine: TriageEngine,
) -> (
    EngineHandle,
    mpsc::UnboundedReceiver<EngineEvent>,
    JoinHandle<()>,
) {
    let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(engine, rx, events_tx));
    (EngineHandle { tx }, events_rx, task)
}

impl EngineHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, TriageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| TriageError::Stopped)?;
        rx.await.map_err(|_| TriageError::Stopped)
    }

    pub async fn execute(&self, command: Command) -> Result<Reply, TriageError> {
        self.call(|tx| Request::Command(command, tx)).await?
    }

    /// Rescans the saved session's source, if any, and restores its cursor.
    pub async fn resume(&self) -> Result<Option<ScanSummary>, TriageError> {
        self.call(Request::Resume).await?
    }

    pub async fn current_item(&self) -> Result<Option<Item>, TriageError> {
        self.call(Request::CurrentItem).await
    }

    pub async fn progress(&self) -> Result<(usize, usize), TriageError> {
        self.call(Request::Progress).await
    }

    pub async fn selected_count(&self) -> Result<usize, TriageError> {
        self.call(Request::SelectedCount).await
    }

    pub async fn state(&self) -> Result<EngineState, TriageError> {
        self.call(Request::State).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot, TriageError> {
        self.call(Request::Snapshot).await
    }

    pub async fn checkpoint(&self) -> Result<(), TriageError> {
        self.call(Request::Checkpoint).await?
    }

    /// Saves the session and stops the owner task.
    pub async fn shutdown(self) -> Result<(), TriageError> {
        self.call(Request::Shutdown).await?
    }
}

async fn run(
    mut engine: TriageEngine,
    mut rx: mpsc::Receiver<Request>,
    events: mpsc::UnboundedSender<EngineEvent>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            Request::Command(Command::Scan(source), reply) => {
                let result = scan(&mut engine, &mut rx, &events, source, None).await;
                let _ = reply.send(result.map(Reply::Scanned));
            }
            Request::Resume(reply) => {
                let result = match engine.saved_session() {
                    Some(saved) => {
                        scan(&mut engine, &mut rx, &events, saved.source, Some(saved.index))
                            .await
                            .map(Some)
                    }
                    None => Ok(None),
                };
                let _ = reply.send(result);
            }
            Request::Command(Command::ExportAndClose, reply) => {
                let result = export(&mut engine, &mut rx, &events).await;
                let _ = reply.send(result.map(Reply::Exported));
            }
            Request::Shutdown(reply) => {
                let _ = reply.send(engine.checkpoint());
                info!("engine stopped");
                return;
            }
            other => serve(&mut engine, other),
        }
    }
    if let Err(e) = engine.shutdown() {
        error!("final checkpoint failed: {}", e);
    }
}

async fn scan(
    engine: &mut TriageEngine,
    rx: &mut mpsc::Receiver<Request>,
    events: &mpsc::UnboundedSender<EngineEvent>,
    source: String,
    resume_index: Option<usize>,
) -> Result<ScanSummary, TriageError> {
    engine.begin_scan()?;
    let opts = engine.config().scan.clone();
    let location = source.clone();
    let mut work = tokio::task::spawn_blocking(move || catalog::scan(&location, &opts));

    let joined = loop {
        tokio::select! {
            joined = &mut work => break joined,
            Some(request) = rx.recv() => serve(engine, request),
        }
    };
    let result = joined.unwrap_or_else(|e| {
        Err(TriageError::SourceUnavailable {
            source_location: source.clone(),
            source: io::Error::new(io::ErrorKind::Other, e.to_string()),
        })
    });
    let summary = engine.finish_scan(&source, result, resume_index)?;
    let _ = events.send(EngineEvent::ScanFinished {
        source: summary.source.clone(),
        total: summary.total,
    });
    Ok(summary)
}

async fn export(
    engine: &mut TriageEngine,
    rx: &mut mpsc::Receiver<Request>,
    events: &mpsc::UnboundedSender<EngineEvent>,
) -> Result<ExportSummary, TriageError> {
    let snapshot = engine.begin_export()?;
    let job = engine.export_job();
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let mut work = tokio::task::spawn_blocking(move || {
        job.run(&snapshot, |done, total| {
            let _ = progress_tx.send((done, total));
        })
    });

    let joined = loop {
        tokio::select! {
            biased;
            Some((done, total)) = progress_rx.recv() => {
                let _ = events.send(EngineEvent::ExportProgress { done, total });
            }
            joined = &mut work => break joined,
            Some(request) = rx.recv() => serve(engine, request),
        }
    };
    while let Ok((done, total)) = progress_rx.try_recv() {
        let _ = events.send(EngineEvent::ExportProgress { done, total });
    }
    let records = joined.unwrap_or_else(|e| {
        error!("export worker failed: {}", e);
        Vec::new()
    });

    let summary = engine.finish_export(records);
    let _ = events.send(EngineEvent::ExportFinished {
        copied: summary.copied(),
        failed: summary.failed(),
    });
    Ok(summary)
}

/// Answers a request without suspending. Long-running commands only get here
/// while another one is in flight, so they are refused.
fn serve(engine: &mut TriageEngine, request: Request) {
    match request {
        Request::Command(command, reply) => {
            let result = match command {
                Command::Next => engine.next().map(Reply::Moved),
                Command::Previous => engine.previous().map(Reply::Moved),
                Command::Categorize(category) => {
                    engine.categorize(category).map(Reply::Categorized)
                }
                Command::Scan(_) | Command::ExportAndClose => Err(busy(engine)),
            };
            let _ = reply.send(result);
        }
        Request::Resume(reply) => {
            let _ = reply.send(Err(busy(engine)));
        }
        Request::CurrentItem(reply) => {
            let _ = reply.send(engine.current_item().cloned());
        }
        Request::Progress(reply) => {
            let _ = reply.send(engine.progress());
        }
        Request::SelectedCount(reply) => {
            let _ = reply.send(engine.selected_count());
        }
        Request::State(reply) => {
            let _ = reply.send(engine.state());
        }
        Request::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
        }
        Request::Checkpoint(reply) => {
            let _ = reply.send(engine.checkpoint());
        }
        Request::Shutdown(reply) => {
            let _ = reply.send(Err(busy(engine)));
        }
    }
}

fn busy(engine: &TriageEngine) -> TriageError {
    match engine.ensure_available() {
        Err(e) => e,
        Ok(()) => TriageError::EngineBusy("another command"),
    }
}
