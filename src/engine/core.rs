// src/engine/core.rs

//! Pure pool state machine.
//!
//! [`PoolCore`] consumes [`PoolEvent`]s and produces:
//! - an updated pool state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Pool`) is responsible for:
//! - reading events from the channel
//! - forking, messaging and disconnecting workers through a backend
//!
//! The core does no IO and has no Tokio types, so the whole lifecycle can be
//! unit tested by feeding it events by hand.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::anyhow;
use tracing::warn;

use crate::engine::event_handlers::{
    handle_batch_request, handle_drain, handle_exited, handle_malformed, handle_online,
    handle_ready, handle_shutdown, handle_worker_error, start_batch, CoreStep,
};
use crate::engine::queue::{BatchQueue, JobQueue};
use crate::engine::{PoolEvent, PoolOptions, PoolSummary};
use crate::errors::{ClusterError, Result};
use crate::protocol::WorkerEvent;
use crate::types::WorkerId;

/// Lifecycle of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// No workers and no active batch.
    Idle,
    /// Workers have been forked and are not all online yet.
    Forking,
    /// Every worker has its `start` command; waiting for all `ready`s.
    AwaitingReady,
    /// Build jobs are being handed out.
    Scheduling,
    /// Every job has been handed out; waiting for the last drains.
    Draining,
    /// The active batch just drained.
    Finished,
    /// Workers have been told to exit.
    Disconnecting,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolState::Idle => "idle",
            PoolState::Forking => "forking",
            PoolState::AwaitingReady => "awaiting-ready",
            PoolState::Scheduling => "scheduling",
            PoolState::Draining => "draining",
            PoolState::Finished => "finished",
            PoolState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Coordinator's view of one worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerRecord {
    /// The backend reported the worker up.
    pub online: bool,
    /// Reported `ready` for the active batch.
    pub ready: bool,
    /// File currently being built.
    pub busy: Option<PathBuf>,
    /// A disconnect was issued; its exit is expected.
    pub disconnecting: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ActiveBatch {
    pub number: usize,
    pub read: Vec<PathBuf>,
    pub built: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum Failure {
    Worker { id: WorkerId, detail: String },
    Interrupted,
}

/// Pure pool state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct PoolCore {
    pub(super) options: PoolOptions,
    pub(super) state: PoolState,
    pub(super) next_id: u32,
    pub(super) workers: BTreeMap<WorkerId, WorkerRecord>,
    /// Ready workers counted toward the barrier of the active batch.
    pub(super) readied: usize,
    pub(super) jobs: JobQueue,
    pub(super) deferred: BatchQueue,
    pub(super) active: Option<ActiveBatch>,
    pub(super) batches_started: usize,
    pub(super) summary: PoolSummary,
    pub(super) failure: Option<Failure>,
}

impl PoolCore {
    pub fn new(mut options: PoolOptions) -> Self {
        options.workers = options.workers.max(1);
        Self {
            options,
            state: PoolState::Idle,
            next_id: 1,
            workers: BTreeMap::new(),
            readied: 0,
            jobs: JobQueue::new(),
            deferred: BatchQueue::new(),
            active: None,
            batches_started: 0,
            summary: PoolSummary::default(),
            failure: None,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Ids of workers that have not exited yet.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    pub fn worker(&self, id: WorkerId) -> Option<&WorkerRecord> {
        self.workers.get(&id)
    }

    pub fn readied(&self) -> usize {
        self.readied
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn deferred_batches(&self) -> usize {
        self.deferred.len()
    }

    pub fn summary(&self) -> PoolSummary {
        self.summary
    }

    /// Handle a single event, updating state and returning the commands the
    /// IO shell must execute.
    pub fn step(&mut self, event: PoolEvent) -> CoreStep {
        let mut step = match event {
            PoolEvent::BatchRequested(plan) => handle_batch_request(self, plan),
            PoolEvent::Online(id) => handle_online(self, id),
            PoolEvent::Message { id, event } => {
                if event.id() != id {
                    warn!("worker[{id}] sent an event tagged worker[{}]", event.id());
                }
                match event {
                    WorkerEvent::Ready { .. } => handle_ready(self, id),
                    WorkerEvent::Drain { file, .. } => handle_drain(self, id, file),
                    WorkerEvent::Error { detail, .. } => handle_worker_error(self, id, detail),
                }
            }
            PoolEvent::Malformed { id, raw, reason } => handle_malformed(self, id, raw, reason),
            PoolEvent::Exited { id, code } => handle_exited(self, id, code),
            PoolEvent::ShutdownRequested => handle_shutdown(self),
        };

        let (mut more, keep_running) = self.settle();
        step.commands.append(&mut more);
        step.keep_running = keep_running;
        step
    }

    /// Once every worker is gone after a disconnect, either start the next
    /// deferred batch on a fresh pool or stop.
    fn settle(&mut self) -> (Vec<crate::engine::PoolCommand>, bool) {
        if self.state != PoolState::Disconnecting || !self.workers.is_empty() {
            return (Vec::new(), true);
        }

        if self.failure.is_none() {
            if let Some(next) = self.deferred.pop() {
                self.state = PoolState::Idle;
                return (start_batch(self, next), true);
            }
        }

        (Vec::new(), false)
    }

    /// Final result once the core has asked to stop.
    pub fn into_result(self) -> Result<PoolSummary> {
        match self.failure {
            Some(Failure::Worker { id, detail }) => Err(ClusterError::WorkerFailed { id, detail }),
            Some(Failure::Interrupted) => Err(ClusterError::Interrupted),
            None if self.active.is_some() => Err(ClusterError::Other(anyhow!(
                "pool stopped while a batch was in progress"
            ))),
            None => Ok(self.summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::BatchPlan;
    use crate::engine::PoolCommand;
    use crate::protocol::WorkerCommand;

    fn core(workers: usize) -> PoolCore {
        PoolCore::new(PoolOptions {
            workers,
            source_root: "/src".into(),
            output_root: "/out".into(),
        })
    }

    fn plan(files: &[&str]) -> BatchPlan {
        let files: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
        BatchPlan {
            process: files.clone(),
            read: files,
        }
    }

    fn ready(id: u32) -> PoolEvent {
        PoolEvent::Message {
            id: WorkerId(id),
            event: WorkerEvent::Ready { id: WorkerId(id) },
        }
    }

    fn drain(id: u32) -> PoolEvent {
        PoolEvent::Message {
            id: WorkerId(id),
            event: WorkerEvent::Drain {
                id: WorkerId(id),
                file: None,
            },
        }
    }

    fn exited(id: u32, code: i32) -> PoolEvent {
        PoolEvent::Exited {
            id: WorkerId(id),
            code: Some(code),
        }
    }

    fn forks(step: &CoreStep) -> Vec<u32> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                PoolCommand::Fork(id) => Some(id.0),
                _ => None,
            })
            .collect()
    }

    fn builds(step: &CoreStep) -> Vec<(u32, PathBuf, PathBuf)> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                PoolCommand::Send(id, WorkerCommand::Build { file, dest }) => {
                    Some((id.0, file.clone(), dest.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn disconnects(step: &CoreStep) -> Vec<u32> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                PoolCommand::Disconnect(id) => Some(id.0),
                _ => None,
            })
            .collect()
    }

    /// Fork, bring online and ready every worker of a fresh batch.
    fn bring_up(core: &mut PoolCore, files: &[&str]) -> Vec<CoreStep> {
        let first = core.step(PoolEvent::BatchRequested(plan(files)));
        let ids = forks(&first);
        let mut steps = vec![first];
        for id in &ids {
            steps.push(core.step(PoolEvent::Online(WorkerId(*id))));
        }
        for id in &ids {
            steps.push(core.step(ready(*id)));
        }
        steps
    }

    #[test]
    fn batch_request_forks_configured_workers() {
        let mut core = core(3);
        let step = core.step(PoolEvent::BatchRequested(plan(&["/src/a.less"])));
        assert_eq!(forks(&step), vec![1, 2, 3]);
        assert_eq!(core.state(), PoolState::Forking);
        assert!(step.keep_running);
    }

    #[test]
    fn online_worker_receives_start_with_read_set() {
        let mut core = core(1);
        core.step(PoolEvent::BatchRequested(BatchPlan {
            process: vec!["/src/a.less".into()],
            read: vec!["/src/a.less".into(), "/src/b.less".into()],
        }));
        let step = core.step(PoolEvent::Online(WorkerId(1)));
        assert!(matches!(
            &step.commands[..],
            [PoolCommand::Send(WorkerId(1), WorkerCommand::Start { data })] if data.len() == 2
        ));
        assert_eq!(core.state(), PoolState::AwaitingReady);
    }

    #[test]
    fn no_build_before_every_worker_is_ready() {
        let mut core = core(2);
        core.step(PoolEvent::BatchRequested(plan(&["/src/a.less", "/src/b.less"])));
        core.step(PoolEvent::Online(WorkerId(1)));
        core.step(PoolEvent::Online(WorkerId(2)));

        let first = core.step(ready(1));
        assert!(builds(&first).is_empty());
        assert_eq!(core.readied(), 1);

        let second = core.step(ready(2));
        assert_eq!(builds(&second).len(), 2);
        assert_eq!(core.state(), PoolState::Draining);
    }

    #[test]
    fn duplicate_ready_does_not_count_twice() {
        let mut core = core(2);
        core.step(PoolEvent::BatchRequested(plan(&["/src/a.less"])));
        core.step(PoolEvent::Online(WorkerId(1)));
        core.step(ready(1));
        let step = core.step(ready(1));
        assert!(builds(&step).is_empty());
        assert_eq!(core.readied(), 1);
    }

    #[test]
    fn pool_of_two_builds_three_files() {
        let mut core = core(2);
        let steps = bring_up(&mut core, &["/src/a.less", "/src/b.less", "/src/c.less"]);
        let initial = builds(steps.last().unwrap());
        assert_eq!(core.pending_jobs(), 1);
        assert_eq!(
            initial,
            vec![
                (1, "/src/a.less".into(), "/out/a.css".into()),
                (2, "/src/b.less".into(), "/out/b.css".into()),
            ]
        );

        let step = core.step(drain(2));
        assert_eq!(builds(&step), vec![(2, "/src/c.less".into(), "/out/c.css".into())]);

        let step = core.step(drain(1));
        assert!(matches!(&step.commands[..], [PoolCommand::WorkerIdle(WorkerId(1))]));

        let step = core.step(drain(2));
        assert!(step
            .commands
            .iter()
            .any(|c| matches!(c, PoolCommand::BatchFinished { built: 3, .. })));
        assert_eq!(disconnects(&step), vec![1, 2]);
        assert_eq!(core.state(), PoolState::Disconnecting);

        core.step(exited(1, 0));
        let last = core.step(exited(2, 0));
        assert!(!last.keep_running);
        assert_eq!(core.into_result().unwrap().built, 3);
    }

    #[test]
    fn unexpected_exit_forks_exactly_one_replacement() {
        let mut core = core(2);
        bring_up(&mut core, &["/src/a.less", "/src/b.less", "/src/c.less"]);

        let step = core.step(exited(1, 1));
        assert_eq!(forks(&step), vec![3]);
        assert_eq!(disconnects(&step), vec![1]);
        assert!(step.keep_running);

        // The replacement joins once it reports ready and picks up work.
        let step = core.step(PoolEvent::Online(WorkerId(3)));
        assert!(matches!(
            &step.commands[..],
            [PoolCommand::Send(WorkerId(3), WorkerCommand::Start { .. })]
        ));
        let step = core.step(ready(3));
        assert_eq!(builds(&step), vec![(3, "/src/c.less".into(), "/out/c.css".into())]);
        assert_eq!(core.summary().replaced, 1);
    }

    #[test]
    fn graceful_exit_after_disconnect_forks_nothing() {
        let mut core = core(1);
        bring_up(&mut core, &["/src/a.less"]);
        let step = core.step(drain(1));
        assert_eq!(disconnects(&step), vec![1]);

        let step = core.step(exited(1, 0));
        assert!(forks(&step).is_empty());
        assert!(disconnects(&step).is_empty());
        assert!(!step.keep_running);
    }

    #[test]
    fn deferred_batch_runs_after_current_on_live_pool() {
        let mut core = core(1);
        bring_up(&mut core, &["/src/a.less"]);

        let step = core.step(PoolEvent::BatchRequested(plan(&["/src/b.less"])));
        assert!(step.commands.is_empty());
        assert_eq!(core.deferred_batches(), 1);

        let step = core.step(drain(1));
        assert!(disconnects(&step).is_empty());
        assert!(forks(&step).is_empty());
        assert!(matches!(
            step.commands.last(),
            Some(PoolCommand::Send(WorkerId(1), WorkerCommand::Start { data })) if data == &vec![PathBuf::from("/src/b.less")]
        ));
        assert_eq!(core.state(), PoolState::AwaitingReady);

        let step = core.step(ready(1));
        assert_eq!(builds(&step), vec![(1, "/src/b.less".into(), "/out/b.css".into())]);

        let step = core.step(drain(1));
        assert_eq!(disconnects(&step), vec![1]);
        core.step(exited(1, 0));
        assert_eq!(core.into_result().unwrap().batches, 2);
    }

    #[test]
    fn malformed_message_is_not_fatal() {
        let mut core = core(1);
        bring_up(&mut core, &["/src/a.less"]);
        let step = core.step(PoolEvent::Malformed {
            id: WorkerId(1),
            raw: r#"{"foo":"foo"}"#.into(),
            reason: "missing field `evt`".into(),
        });
        assert!(step.commands.is_empty());
        assert!(step.keep_running);
        assert_eq!(core.state(), PoolState::Draining);
    }

    #[test]
    fn worker_error_disconnects_everyone_and_fails() {
        let mut core = core(2);
        bring_up(&mut core, &["/src/a.less", "/src/b.less"]);
        core.step(PoolEvent::BatchRequested(plan(&["/src/later.less"])));

        let step = core.step(PoolEvent::Message {
            id: WorkerId(2),
            event: WorkerEvent::Error {
                id: WorkerId(2),
                detail: "boom".into(),
            },
        });
        assert_eq!(disconnects(&step), vec![1, 2]);
        assert_eq!(core.deferred_batches(), 0);

        core.step(exited(1, 0));
        let last = core.step(exited(2, 0));
        assert!(!last.keep_running);
        assert!(matches!(
            core.into_result(),
            Err(ClusterError::WorkerFailed { id: WorkerId(2), .. })
        ));
    }

    #[test]
    fn shutdown_before_any_batch_stops_immediately() {
        let mut core = core(2);
        let step = core.step(PoolEvent::ShutdownRequested);
        assert!(!step.keep_running);
        assert!(matches!(core.into_result(), Err(ClusterError::Interrupted)));
    }

    #[test]
    fn shutdown_mid_batch_disconnects() {
        let mut core = core(2);
        bring_up(&mut core, &["/src/a.less", "/src/b.less"]);
        let step = core.step(PoolEvent::ShutdownRequested);
        assert_eq!(disconnects(&step), vec![1, 2]);
        assert!(step.keep_running);
    }

    #[test]
    fn worker_ids_are_never_reused() {
        let mut core = core(1);
        bring_up(&mut core, &["/src/a.less", "/src/b.less"]);
        let first = core.step(exited(1, 1));
        assert_eq!(forks(&first), vec![2]);
        assert_eq!(core.worker_ids(), vec![WorkerId(2)]);
        core.step(PoolEvent::Online(WorkerId(2)));
        let second = core.step(exited(2, 1));
        assert_eq!(forks(&second), vec![3]);
    }
}
