// src/worker/serve.rs

//! Worker message loop.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tracing::{debug, error, info_span};

use crate::config::WorkerOptions;
use crate::errors::Result;
use crate::fs::RealFileSystem;
use crate::protocol::{decode_command, encode, WorkerEvent};
use crate::types::WorkerId;

use super::Worker;

/// Drive `worker` from a stream of command lines until it ends.
///
/// Each decoded command produces exactly one event, handed to `emit`.
/// Undecodable lines are logged and skipped. The worker's caches are torn
/// down when the stream closes.
pub fn serve<I, S>(worker: &mut Worker, lines: I, mut emit: S) -> Result<()>
where
    I: IntoIterator<Item = io::Result<String>>,
    S: FnMut(&WorkerEvent) -> Result<()>,
{
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match decode_command(&line) {
            Ok(command) => {
                let event = worker.handle(command);
                emit(&event)?;
            }
            Err(err) => error!(worker = %worker.id(), "{err}"),
        }
    }

    debug!(worker = %worker.id(), "channel closed; tearing down");
    worker.teardown();
    Ok(())
}

/// Entry point of a worker process: commands on stdin, events on stdout.
pub fn serve_stdio(id: WorkerId, options: WorkerOptions) -> Result<()> {
    let _span = info_span!("worker", id = %id).entered();
    let mut worker = Worker::with_options(id, options, Arc::new(RealFileSystem));

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    serve(&mut worker, stdin.lock().lines(), |event| {
        let line = encode(event)?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    })
}
