//! Line-oriented triage session. Each input line is one spoken or typed
//! command; replies go to `out`.

use anyhow::Result;
use curator_core::command::Command;
use curator_core::engine::{Categorized, ExportSummary, ScanSummary};
use curator_core::models::Step;
use curator_core::service::{EngineEvent, EngineHandle, Reply};
use curator_core::TriageError;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedReceiver;

/// How a session ended.
#[derive(Debug)]
pub enum Outcome {
    /// Input ran out; the position was saved for the next run.
    Paused,
    Exported(ExportSummary),
}

pub async fn drive<R, W>(
    handle: &EngineHandle,
    events: &mut UnboundedReceiver<EngineEvent>,
    input: R,
    out: &mut W,
) -> Result<Outcome>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    show_current(handle, out).await?;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(c) => c,
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };
        let call = handle.execute(command);
        tokio::pin!(call);
        let reply = loop {
            tokio::select! {
                reply = &mut call => break reply,
                Some(event) = events.recv() => print_event(event, out)?,
            }
        };
        while let Ok(event) = events.try_recv() {
            print_event(event, out)?;
        }
        match reply {
            Ok(Reply::Exported(summary)) => {
                print_export(&summary, out)?;
                return Ok(Outcome::Exported(summary));
            }
            Ok(reply) => render(reply, handle, out).await?,
            Err(TriageError::Stopped) => return Err(TriageError::Stopped.into()),
            Err(e) => writeln!(out, "{}", e)?,
        }
        checkpoint(handle, out).await?;
    }
    checkpoint(handle, out).await?;
    Ok(Outcome::Paused)
}

/// A failed session save is reported and the session carries on.
async fn checkpoint<W: Write>(handle: &EngineHandle, out: &mut W) -> Result<()> {
    match handle.checkpoint().await {
        Ok(()) => Ok(()),
        Err(TriageError::Stopped) => Err(TriageError::Stopped.into()),
        Err(e) => {
            writeln!(out, "warning: {}", e)?;
            Ok(())
        }
    }
}

async fn render<W: Write>(reply: Reply, handle: &EngineHandle, out: &mut W) -> Result<()> {
    match reply {
        Reply::Scanned(summary) => print_scan(&summary, out)?,
        Reply::Moved(Step::NoMoreItems) => writeln!(out, "No more images.")?,
        Reply::Moved(Step::AlreadyAtStart) => writeln!(out, "Already at the first image.")?,
        Reply::Moved(Step::Moved(_)) => {}
        Reply::Categorized(done) => print_categorized(&done, out)?,
        Reply::Exported(summary) => return print_export(&summary, out),
    }
    show_current(handle, out).await
}

async fn show_current<W: Write>(handle: &EngineHandle, out: &mut W) -> Result<()> {
    let (index, total) = handle.progress().await?;
    if let Some(item) = handle.current_item().await? {
        writeln!(out, "Image {} of {}: {}", index + 1, total, item.display_name())?;
    }
    Ok(())
}

fn print_event<W: Write>(event: EngineEvent, out: &mut W) -> Result<()> {
    if let EngineEvent::ExportProgress { done, total } = event {
        writeln!(out, "Exporting {}/{}", done, total)?;
    }
    Ok(())
}

fn print_scan<W: Write>(summary: &ScanSummary, out: &mut W) -> Result<()> {
    if summary.total == 0 {
        writeln!(out, "No images found in {}.", summary.source)?;
    } else {
        writeln!(out, "Loaded {} images from {}.", summary.total, summary.source)?;
    }
    Ok(())
}

fn print_categorized<W: Write>(done: &Categorized, out: &mut W) -> Result<()> {
    writeln!(
        out,
        "Marked {} as {}.",
        curator_core::models::display_name_of(&done.item),
        done.category
    )?;
    if let Some(e) = &done.write_error {
        writeln!(out, "warning: {} (kept in memory)", e)?;
    }
    if done.step == Step::NoMoreItems {
        writeln!(out, "No more images.")?;
    }
    Ok(())
}

pub fn print_export<W: Write>(summary: &ExportSummary, out: &mut W) -> Result<()> {
    for record in &summary.records {
        writeln!(
            out,
            "{}: copied {}, failed {} -> {}",
            record.category,
            record.copied,
            record.failed,
            record.destination.display()
        )?;
    }
    for e in &summary.write_errors {
        writeln!(out, "warning: {}", e)?;
    }
    writeln!(
        out,
        "export summary: success={}, failed={}",
        summary.copied(),
        summary.failed()
    )?;
    Ok(())
}
