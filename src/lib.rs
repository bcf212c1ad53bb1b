// src/lib.rs

pub mod cli;
pub mod config;
pub mod deps;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod protocol;
pub mod types;
pub mod worker;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{resolve_options, validate_options, ClusterOptions};
use crate::deps::{BatchPlan, Collector};
use crate::engine::{Pool, PoolCore, PoolEvent, PoolOptions, PoolSummary};
use crate::exec::{InProcessBackend, ProcessBackend};
use crate::fs::paths::relative_str;
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::WorkerId;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - collection and ad-hoc filtering
/// - the worker pool and its backend
/// - Ctrl-C / SIGTERM handling
///
/// With `--worker <ID>` the binary instead serves as one pool worker.
pub async fn run(args: CliArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;

    if let Some(id) = args.worker {
        let options = args.worker_options(&cwd);
        // Ctrl-C is the coordinator's to handle; it disconnects workers.
        tokio::spawn(async {
            let _ = tokio::signal::ctrl_c().await;
        });
        tokio::task::spawn_blocking(move || worker::serve_stdio(WorkerId(id), options)).await??;
        return Ok(());
    }

    let mut options = resolve_options(args.config.as_deref(), args.to_section(), &cwd)?;
    options.log_level = args.log_level;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    validate_options(&options, fs.as_ref())?;

    let mut collector = Collector::new(options.clone(), fs.clone());
    let plan = collector.collect()?;

    if args.dry_run {
        print_dry_run(&collector, &plan);
        return Ok(());
    }

    if plan.is_empty() {
        warn!(dir = ?options.directory, "nothing to compile");
        return Ok(());
    }

    let summary = run_pool(&options, fs, vec![plan]).await?;
    info!(built = summary.built, "done");
    Ok(())
}

/// Compile `batches` one after another on a pool configured from `options`.
///
/// `workers = 0` runs a single in-process worker; anything else forks that
/// many child processes of the current executable.
pub async fn run_pool(
    options: &ClusterOptions,
    fs: Arc<dyn FileSystem>,
    batches: Vec<BatchPlan>,
) -> crate::errors::Result<PoolSummary> {
    let (tx, rx) = mpsc::channel::<PoolEvent>(64);

    spawn_signal_listener(tx.clone());

    for plan in batches {
        tx.send(PoolEvent::BatchRequested(plan))
            .await
            .map_err(|e| anyhow::anyhow!("seeding batch: {e}"))?;
    }

    let core = PoolCore::new(PoolOptions {
        workers: options.workers.max(1),
        source_root: options.directory.clone(),
        output_root: options.output_dir.clone(),
    });
    let worker_options = options.worker_options();

    if options.workers == 0 {
        debug!("workers = 0; compiling in-process");
        let backend = InProcessBackend::new(worker_options, fs, tx);
        Pool::new(core, rx, backend).run().await
    } else {
        let backend = ProcessBackend::current_exe(&worker_options, tx)?;
        Pool::new(core, rx, backend).run().await
    }
}

/// Ctrl-C (and SIGTERM on unix) → graceful shutdown.
fn spawn_signal_listener(tx: mpsc::Sender<PoolEvent>) {
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            eprintln!("failed to listen for shutdown signals: {e}");
            return;
        }
        let _ = tx.send(PoolEvent::ShutdownRequested).await;
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Dry-run output: the batch that would be compiled.
fn print_dry_run(collector: &Collector, plan: &BatchPlan) {
    let options = collector.options();
    let root = options.directory.as_path();

    println!("less-cluster dry-run");
    println!("  directory = {}", options.directory.display());
    println!("  output_dir = {}", options.output_dir.display());
    println!("  match = {}", options.match_pattern);
    println!("  workers = {}", options.workers);
    if !options.include_paths.is_empty() {
        println!("  include_paths = {:?}", options.include_paths);
    }
    println!();

    println!("process ({}):", plan.process.len());
    for file in &plan.process {
        println!(
            "  - {} -> {}",
            display_rel(root, file),
            collector.destination_for(file).display()
        );
    }

    println!("read ({}):", plan.read.len());
    for file in &plan.read {
        println!("  - {}", display_rel(root, file));
    }

    debug!("dry-run complete (no compilation)");
}

fn display_rel(root: &Path, file: &Path) -> String {
    relative_str(root, file).unwrap_or_else(|| file.display().to_string())
}
