// src/exec/in_process.rs

use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::WorkerOptions;
use crate::engine::PoolEvent;
use crate::errors::{ClusterError, Result};
use crate::exec::backend::{BackendFuture, WorkerBackend};
use crate::fs::FileSystem;
use crate::protocol::{encode, WorkerCommand};
use crate::types::WorkerId;
use crate::worker::{serve, Worker};

/// Runs workers on blocking threads inside this process.
///
/// Commands still travel as encoded JSON lines, so the worker sees exactly
/// what a child process would read on stdin.
#[derive(Debug)]
pub struct InProcessBackend {
    options: WorkerOptions,
    fs: Arc<dyn FileSystem>,
    events: mpsc::Sender<PoolEvent>,
    inboxes: HashMap<WorkerId, std_mpsc::Sender<String>>,
}

impl InProcessBackend {
    pub fn new(options: WorkerOptions, fs: Arc<dyn FileSystem>, events: mpsc::Sender<PoolEvent>) -> Self {
        Self {
            options,
            fs,
            events,
            inboxes: HashMap::new(),
        }
    }
}

impl WorkerBackend for InProcessBackend {
    fn fork(&mut self, id: WorkerId) -> BackendFuture<'_> {
        Box::pin(async move {
            let (tx, rx) = std_mpsc::channel::<String>();
            self.inboxes.insert(id, tx);

            let mut worker = Worker::with_options(id, self.options.clone(), self.fs.clone());
            let events = self.events.clone();

            tokio::task::spawn_blocking(move || {
                if events.blocking_send(PoolEvent::Online(id)).is_err() {
                    return;
                }

                let lines = rx.into_iter().map(Ok);
                let result = serve(&mut worker, lines, |event| {
                    events
                        .blocking_send(PoolEvent::Message {
                            id,
                            event: event.clone(),
                        })
                        .map_err(|_| ClusterError::Other(anyhow!("pool event channel closed")))
                });

                let code = match result {
                    Ok(()) => 0,
                    Err(err) => {
                        error!("worker[{id}] stopped: {err}");
                        1
                    }
                };
                let _ = events.blocking_send(PoolEvent::Exited { id, code: Some(code) });
            });

            debug!("worker[{id}] started in-process.");
            Ok(())
        })
    }

    fn send(&mut self, id: WorkerId, command: WorkerCommand) -> BackendFuture<'_> {
        Box::pin(async move {
            let inbox = self
                .inboxes
                .get(&id)
                .ok_or_else(|| ClusterError::ProtocolError(format!("no channel to worker[{id}]")))?;
            let line = encode(&command)?;
            inbox
                .send(line)
                .map_err(|_| ClusterError::ProtocolError(format!("worker[{id}] is gone")))?;
            Ok(())
        })
    }

    fn disconnect(&mut self, id: WorkerId) -> BackendFuture<'_> {
        Box::pin(async move {
            if self.inboxes.remove(&id).is_some() {
                debug!("worker[{id}] disconnected.");
            }
            Ok(())
        })
    }
}
