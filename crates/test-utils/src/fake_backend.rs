use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::mpsc;
use less_cluster::engine::PoolEvent;
use less_cluster::errors::{ClusterError, Result};
use less_cluster::exec::{BackendFuture, WorkerBackend};
use less_cluster::protocol::{WorkerCommand, WorkerEvent};
use less_cluster::types::WorkerId;

/// Scripted misbehaviour for [`FakeBackend`].
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Building any of these reports an `error` event.
    pub fail_builds: HashSet<PathBuf>,
    /// The worker building one of these dies (exit code 1), once per file.
    pub crash_builds: HashSet<PathBuf>,
    /// Every worker writes a line of garbage before its `ready`.
    pub garbage_before_ready: bool,
}

/// A fake backend that:
/// - records every fork, command and disconnect as a line in `log`
/// - answers immediately the way a healthy worker would
///   (`online`, `ready` after `start`, `drain` after `build`, exit after
///   disconnect), unless the [`Script`] says otherwise.
pub struct FakeBackend {
    events: mpsc::Sender<PoolEvent>,
    log: Arc<Mutex<Vec<String>>>,
    script: Script,
    dead: HashSet<WorkerId>,
}

impl FakeBackend {
    pub fn new(events: mpsc::Sender<PoolEvent>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self::scripted(events, log, Script::default())
    }

    pub fn scripted(
        events: mpsc::Sender<PoolEvent>,
        log: Arc<Mutex<Vec<String>>>,
        script: Script,
    ) -> Self {
        Self {
            events,
            log,
            script,
            dead: HashSet::new(),
        }
    }

    fn record(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }
}

impl WorkerBackend for FakeBackend {
    fn fork(&mut self, id: WorkerId) -> BackendFuture<'_> {
        self.record(format!("fork {id}"));
        let tx = self.events.clone();

        Box::pin(async move {
            tx.send(PoolEvent::Online(id))
                .await
                .map_err(|e| anyhow!("{e}"))?;
            Ok(())
        })
    }

    fn send(&mut self, id: WorkerId, command: WorkerCommand) -> BackendFuture<'_> {
        let tx = self.events.clone();

        if self.dead.contains(&id) {
            return Box::pin(async move {
                Err(ClusterError::ProtocolError(format!("worker[{id}] is gone")))
            });
        }

        let mut replies = Vec::new();
        match command {
            WorkerCommand::Start { data } => {
                self.record(format!("start {id} ({} files)", data.len()));
                if self.script.garbage_before_ready {
                    replies.push(PoolEvent::Malformed {
                        id,
                        raw: r#"{"foo":"foo"}"#.to_string(),
                        reason: "missing field `evt`".to_string(),
                    });
                }
                replies.push(PoolEvent::Message {
                    id,
                    event: WorkerEvent::Ready { id },
                });
            }
            WorkerCommand::Build { file, dest } => {
                self.record(format!("build {id} {} -> {}", file.display(), dest.display()));
                if self.script.crash_builds.remove(&file) {
                    self.dead.insert(id);
                    replies.push(PoolEvent::Exited { id, code: Some(1) });
                } else if self.script.fail_builds.contains(&file) {
                    replies.push(PoolEvent::Message {
                        id,
                        event: WorkerEvent::Error {
                            id,
                            detail: format!("cannot compile {}", file.display()),
                        },
                    });
                } else {
                    replies.push(PoolEvent::Message {
                        id,
                        event: WorkerEvent::Drain {
                            id,
                            file: Some(file),
                        },
                    });
                }
            }
        }

        Box::pin(async move {
            for event in replies {
                tx.send(event).await.map_err(|e| anyhow!("{e}"))?;
            }
            Ok(())
        })
    }

    fn disconnect(&mut self, id: WorkerId) -> BackendFuture<'_> {
        self.record(format!("disconnect {id}"));
        let tx = self.events.clone();
        let alive = self.dead.insert(id);

        Box::pin(async move {
            if alive {
                tx.send(PoolEvent::Exited { id, code: Some(0) })
                    .await
                    .map_err(|e| anyhow!("{e}"))?;
            }
            Ok(())
        })
    }
}
