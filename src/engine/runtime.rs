// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::WorkerBackend;

use super::core::PoolCore;
use super::{PoolCommand, PoolEvent, PoolSummary};

/// Drives the pool core in response to `PoolEvent`s, and delegates worker
/// handling to a `WorkerBackend`.
///
/// This is a pure IO shell around `PoolCore`, which contains all the pool
/// semantics. This struct handles async IO: reading events from the channel
/// and talking to workers through the backend.
pub struct Pool<B: WorkerBackend> {
    core: PoolCore,
    event_rx: mpsc::Receiver<PoolEvent>,
    backend: B,
}

impl<B: WorkerBackend> fmt::Debug for Pool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: WorkerBackend> Pool<B> {
    pub fn new(core: PoolCore, event_rx: mpsc::Receiver<PoolEvent>, backend: B) -> Self {
        Self {
            core,
            event_rx,
            backend,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `PoolEvent`s from `event_rx`.
    /// - Feeds them into the core.
    /// - Executes the commands the core returns (fork, send, disconnect).
    ///
    /// Returns once the core asks to stop, with the run's summary or the
    /// failure that ended it.
    pub async fn run(mut self) -> Result<PoolSummary> {
        info!(workers = self.core.options().workers, "pool started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("pool event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "pool received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                debug!(state = %self.core.state(), "core requested exit; stopping pool");
                break;
            }
        }

        let result = self.core.into_result();
        if let Ok(summary) = &result {
            info!(
                batches = summary.batches,
                built = summary.built,
                replaced = summary.replaced,
                "pool finished"
            );
        }
        result
    }

    /// Execute a single command from the core.
    ///
    /// Only a failed fork is fatal. A send or disconnect that fails means the
    /// worker is already gone; its exit event will follow.
    async fn execute_command(&mut self, command: PoolCommand) -> Result<()> {
        match command {
            PoolCommand::Fork(id) => {
                self.backend.fork(id).await?;
            }
            PoolCommand::Send(id, cmd) => {
                if let Err(err) = self.backend.send(id, cmd).await {
                    warn!(error = %err, "could not reach worker[{id}]");
                }
            }
            PoolCommand::Disconnect(id) => {
                if let Err(err) = self.backend.disconnect(id).await {
                    warn!(error = %err, "could not disconnect worker[{id}]");
                }
            }
            PoolCommand::WorkerIdle(id) => {
                debug!("worker[{id}] idle; queue empty");
            }
            PoolCommand::BatchFinished { batch, built } => {
                info!(batch, built, "all files in batch compiled");
            }
        }
        Ok(())
    }
}
