// src/exec/process.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, Context};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::WorkerOptions;
use crate::engine::PoolEvent;
use crate::errors::{ClusterError, Result};
use crate::exec::backend::{BackendFuture, WorkerBackend};
use crate::protocol::{decode_event, encode, WorkerCommand};
use crate::types::WorkerId;

/// Runs every worker as a child process: `<program> --worker <ID> ...`.
///
/// Commands go to the child's stdin, events come back on its stdout, and
/// its stderr is inherited so worker logs land next to the coordinator's.
/// Closing stdin is the disconnect signal.
#[derive(Debug)]
pub struct ProcessBackend {
    program: PathBuf,
    args: Vec<String>,
    events: mpsc::Sender<PoolEvent>,
    stdins: HashMap<WorkerId, ChildStdin>,
}

impl ProcessBackend {
    pub fn new(program: PathBuf, options: &WorkerOptions, events: mpsc::Sender<PoolEvent>) -> Self {
        Self {
            program,
            args: options.to_args(),
            events,
            stdins: HashMap::new(),
        }
    }

    /// Re-execute the running binary in worker mode.
    pub fn current_exe(options: &WorkerOptions, events: mpsc::Sender<PoolEvent>) -> Result<Self> {
        let program = std::env::current_exe().context("locating current executable")?;
        Ok(Self::new(program, options, events))
    }

    fn spawn(&mut self, id: WorkerId) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg("--worker")
            .arg(id.to_string())
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning worker[{id}] from {:?}", self.program))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("worker[{id}] stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("worker[{id}] stdout was not captured"))?;

        self.stdins.insert(id, stdin);
        debug!(pid = child.id(), "worker[{id}] forked.");

        tokio::spawn(monitor(id, child, stdout, self.events.clone()));
        Ok(())
    }
}

/// Report the worker online, forward its stdout as events, then report its
/// exit.
async fn monitor(id: WorkerId, mut child: Child, stdout: ChildStdout, events: mpsc::Sender<PoolEvent>) {
    if events.send(PoolEvent::Online(id)).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                let event = match decode_event(&line) {
                    Ok(event) => PoolEvent::Message { id, event },
                    Err(err) => PoolEvent::Malformed {
                        id,
                        raw: line,
                        reason: err.to_string(),
                    },
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "reading from worker[{id}] failed");
                break;
            }
        }
    }

    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(error = %err, "waiting for worker[{id}] failed");
            None
        }
    };
    let _ = events.send(PoolEvent::Exited { id, code }).await;
}

impl WorkerBackend for ProcessBackend {
    fn fork(&mut self, id: WorkerId) -> BackendFuture<'_> {
        Box::pin(async move { self.spawn(id) })
    }

    fn send(&mut self, id: WorkerId, command: WorkerCommand) -> BackendFuture<'_> {
        Box::pin(async move {
            let stdin = self
                .stdins
                .get_mut(&id)
                .ok_or_else(|| ClusterError::ProtocolError(format!("no channel to worker[{id}]")))?;
            let mut line = encode(&command)?;
            line.push('\n');
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await?;
            Ok(())
        })
    }

    fn disconnect(&mut self, id: WorkerId) -> BackendFuture<'_> {
        Box::pin(async move {
            if self.stdins.remove(&id).is_some() {
                debug!("worker[{id}] disconnected.");
            }
            Ok(())
        })
    }
}
