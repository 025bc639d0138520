use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use curator_cli::report::{self, Status};
use curator_cli::triage::{self, Outcome};
use curator_core::command::Command;
use curator_core::config::{self, AppConfig};
use curator_core::engine::TriageEngine;
use curator_core::service;
use std::io::{self, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Triage { source } => run_triage(cfg, source).await,
        Commands::Export { json } => run_export(cfg, json),
        Commands::Status { json } => run_status(cfg, json),
        Commands::Review => run_review(cfg),
    }
}

#[derive(Parser)]
#[command(name = "curator")]
#[command(about = "Hands-free image triage", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage a directory of images, reading commands from stdin
    Triage {
        /// Directory to scan; resumes the saved session when omitted
        source: Option<String>,
    },
    /// Copy every categorized image into its bucket
    Export {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Show category counts and the saved session
    Status {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// List the selected images
    Review,
}

fn open_engine(cfg: AppConfig) -> Result<TriageEngine> {
    let root = cfg.storage_root();
    TriageEngine::open(cfg).with_context(|| format!("opening storage root {}", root.display()))
}

async fn run_triage(cfg: AppConfig, source: Option<String>) -> Result<()> {
    let engine = open_engine(cfg)?;
    let (handle, mut events, task) = service::spawn(engine);

    let mut out = io::stdout();
    let started = match source {
        Some(dir) => handle.execute(Command::Scan(dir)).await.map(|_| true),
        None => handle.resume().await.map(|s| s.is_some()),
    };
    if !started? {
        bail!("no source given and no saved session to resume");
    }
    let (index, total) = handle.progress().await?;
    writeln!(out, "Loaded {} images; starting at image {}.", total, index + 1)?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let outcome = triage::drive(&handle, &mut events, stdin, &mut out).await?;
    if let Outcome::Paused = outcome {
        info!("Session paused.");
    }
    handle.shutdown().await?;
    task.await?;
    Ok(())
}

fn run_export(cfg: AppConfig, json: bool) -> Result<()> {
    let root = cfg.storage_root();
    let mut engine = TriageEngine::resume(cfg)
        .with_context(|| format!("opening storage root {}", root.display()))?;
    if let Some(e) = engine.resume_failure() {
        eprintln!("warning: saved session not resumed: {}", e);
    }
    let summary = engine.export_and_close(|done, total| {
        if !json {
            eprintln!("Exporting {}/{}", done, total);
        }
    })?;
    let mut out = io::stdout();
    if json {
        let value = serde_json::json!({
            "status": "ok",
            "copied": summary.copied(),
            "failed": summary.failed(),
            "records": summary.records,
            "warnings": summary
                .write_errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        triage::print_export(&summary, &mut out)?;
    }
    Ok(())
}

fn run_status(cfg: AppConfig, json: bool) -> Result<()> {
    let engine = open_engine(cfg)?;
    let status = Status::collect(engine.store(), engine.saved_session());
    status.print(json, &mut io::stdout())
}

fn run_review(cfg: AppConfig) -> Result<()> {
    let engine = open_engine(cfg)?;
    report::review(&engine.snapshot(), &mut io::stdout())
}
