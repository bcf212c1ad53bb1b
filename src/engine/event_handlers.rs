// src/engine/event_handlers.rs

//! Event handling logic for the pool core.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::deps::BatchPlan;
use crate::engine::core::{ActiveBatch, Failure, PoolCore, PoolState, WorkerRecord};
use crate::engine::PoolOptions;
use crate::fs::paths::destination_for;
use crate::protocol::WorkerCommand;
use crate::types::WorkerId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolCommand {
    /// Start a new worker with this id.
    Fork(WorkerId),
    /// Deliver a command to a worker.
    Send(WorkerId, WorkerCommand),
    /// Tell a worker to finish up and exit.
    Disconnect(WorkerId),
    /// The worker drained and there was nothing left to hand it.
    WorkerIdle(WorkerId),
    /// Every file of a batch has been built.
    BatchFinished { batch: usize, built: usize },
}

/// Decision returned by the core after handling a single `PoolEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<PoolCommand>,
    /// Whether the outer loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<PoolCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Handle a batch request.
///
/// - With no batch active, the batch starts right away.
/// - Otherwise it waits in the deferred queue; batches never interleave.
/// - After a failure or interrupt the request is dropped.
pub fn handle_batch_request(core: &mut PoolCore, plan: BatchPlan) -> CoreStep {
    if core.failure.is_some() {
        warn!(files = plan.process.len(), "pool is shutting down; dropping batch request");
        return CoreStep::running(Vec::new());
    }

    if core.active.is_none() && core.state == PoolState::Idle {
        return CoreStep::running(start_batch(core, plan));
    }

    core.deferred.push(plan);
    CoreStep::running(Vec::new())
}

/// Make `plan` the active batch.
///
/// Live workers are reused and sent a fresh `start`; missing ones (up to the
/// configured pool size) are forked and get theirs once online.
pub fn start_batch(core: &mut PoolCore, plan: BatchPlan) -> Vec<PoolCommand> {
    let mut commands = Vec::new();

    core.batches_started += 1;
    info!(
        batch = core.batches_started,
        process = plan.process.len(),
        read = plan.read.len(),
        "starting batch"
    );

    core.jobs.load(plan.process);
    core.readied = 0;

    let mut live = 0;
    for (id, record) in core.workers.iter_mut() {
        if record.disconnecting {
            continue;
        }
        live += 1;
        record.ready = false;
        if record.online {
            commands.push(PoolCommand::Send(
                *id,
                WorkerCommand::Start {
                    data: plan.read.clone(),
                },
            ));
        }
    }

    core.active = Some(ActiveBatch {
        number: core.batches_started,
        read: plan.read,
        built: 0,
    });

    let missing = core.options.workers.saturating_sub(live);
    for _ in 0..missing {
        commands.push(PoolCommand::Fork(allocate(core)));
    }

    core.state = if all_online(core) {
        PoolState::AwaitingReady
    } else {
        PoolState::Forking
    };

    commands
}

/// Handle a worker coming online: hand it the active batch's read set.
pub fn handle_online(core: &mut PoolCore, id: WorkerId) -> CoreStep {
    let mut commands = Vec::new();

    let Some(record) = core.workers.get_mut(&id) else {
        warn!("online event from unknown worker[{id}]");
        return CoreStep::running(commands);
    };
    record.online = true;
    debug!("worker[{id}] online.");

    if record.disconnecting {
        return CoreStep::running(commands);
    }

    if let Some(batch) = &core.active {
        commands.push(PoolCommand::Send(
            id,
            WorkerCommand::Start {
                data: batch.read.clone(),
            },
        ));
    }

    if core.state == PoolState::Forking && all_online(core) {
        core.state = PoolState::AwaitingReady;
    }

    CoreStep::running(commands)
}

/// Handle `ready`.
///
/// Scheduling begins only once the number of ready workers reaches the pool
/// size; a worker that becomes ready after that (a replacement) joins
/// scheduling immediately.
pub fn handle_ready(core: &mut PoolCore, id: WorkerId) -> CoreStep {
    let mut commands = Vec::new();

    let Some(record) = core.workers.get_mut(&id) else {
        warn!("ready from unknown worker[{id}]");
        return CoreStep::running(commands);
    };
    if record.disconnecting {
        return CoreStep::running(commands);
    }
    if record.ready {
        warn!("worker[{id}] reported ready twice; ignoring");
        return CoreStep::running(commands);
    }
    if core.active.is_none() {
        warn!("worker[{id}] reported ready outside a batch");
        return CoreStep::running(commands);
    }

    record.ready = true;
    core.readied += 1;
    debug!(readied = core.readied, workers = core.options.workers, "worker[{id}] ready.");

    match core.state {
        PoolState::Forking | PoolState::AwaitingReady => {
            if core.readied >= core.options.workers {
                info!("all {} workers ready; scheduling builds", core.options.workers);
                core.state = PoolState::Scheduling;
                commands.extend(schedule(core));
                commands.extend(check_finished(core));
            }
        }
        PoolState::Scheduling | PoolState::Draining => {
            debug!("worker[{id}] joined a running batch");
            commands.extend(schedule(core));
        }
        _ => {}
    }

    CoreStep::running(commands)
}

/// Handle `drain`: the worker finished its build and can take another.
pub fn handle_drain(core: &mut PoolCore, id: WorkerId, file: Option<PathBuf>) -> CoreStep {
    let mut commands = Vec::new();

    let Some(record) = core.workers.get_mut(&id) else {
        warn!("drain from unknown worker[{id}]");
        return CoreStep::running(commands);
    };
    let Some(built) = record.busy.take() else {
        warn!("worker[{id}] drained without a build in flight");
        return CoreStep::running(commands);
    };
    if let Some(reported) = file {
        if reported != built {
            warn!(expected = ?built, reported = ?reported, "worker[{id}] drained a different file");
        }
    }
    debug!(file = ?built, "worker[{id}] drained.");

    if let Some(batch) = core.active.as_mut() {
        batch.built += 1;
    }

    if !record.disconnecting && is_scheduling(core.state) {
        match core.jobs.pop() {
            Some(next) => commands.push(dispatch(id, record, next, &core.options)),
            None => commands.push(PoolCommand::WorkerIdle(id)),
        }
        mark_draining(core);
    }

    commands.extend(check_finished(core));
    CoreStep::running(commands)
}

/// Handle an `error` event: fatal for the whole run.
pub fn handle_worker_error(core: &mut PoolCore, id: WorkerId, detail: String) -> CoreStep {
    if core.failure.is_some() {
        debug!(%detail, "worker[{id}] error after failure; ignoring");
        return CoreStep::running(Vec::new());
    }

    error!("worker[{id}] error: {detail}");
    core.failure = Some(Failure::Worker { id, detail });
    let dropped = core.deferred.clear();
    if dropped > 0 {
        warn!(dropped, "discarding deferred batches");
    }
    core.active = None;

    CoreStep::running(begin_disconnect(core))
}

/// A worker wrote something undecodable. Logged, otherwise ignored.
pub fn handle_malformed(_core: &mut PoolCore, id: WorkerId, raw: String, reason: String) -> CoreStep {
    error!(raw = %raw, "protocol error from worker[{id}]: {reason}");
    CoreStep::running(Vec::new())
}

/// Handle a worker exit.
///
/// Exits we asked for are bookkeeping only. Any other exit during an active
/// batch forks exactly one replacement; the build it had in flight is lost.
pub fn handle_exited(core: &mut PoolCore, id: WorkerId, code: Option<i32>) -> CoreStep {
    let mut commands = Vec::new();

    let Some(record) = core.workers.remove(&id) else {
        debug!("exit from unknown worker[{id}]");
        return CoreStep::running(commands);
    };

    // The process is gone; release the backend's channel to it.
    if !record.disconnecting {
        commands.push(PoolCommand::Disconnect(id));
    }

    if record.disconnecting || core.state == PoolState::Disconnecting {
        debug!(?code, "worker[{id}] exited.");
        return CoreStep::running(commands);
    }

    if core.active.is_none() {
        warn!(?code, "worker[{id}] exited outside a batch");
        return CoreStep::running(commands);
    }

    warn!(?code, "worker[{id}] died unexpectedly; forking a replacement");
    if let Some(file) = &record.busy {
        warn!(file = ?file, "build lost with worker[{id}]");
    }
    if record.ready && !is_scheduling(core.state) {
        core.readied = core.readied.saturating_sub(1);
    }

    core.summary.replaced += 1;
    commands.push(PoolCommand::Fork(allocate(core)));
    if core.state == PoolState::AwaitingReady {
        core.state = PoolState::Forking;
    }

    commands.extend(check_finished(core));
    CoreStep::running(commands)
}

/// Handle a shutdown request: disconnect everyone and stop.
pub fn handle_shutdown(core: &mut PoolCore) -> CoreStep {
    let dropped = core.deferred.clear();

    if core.state == PoolState::Disconnecting {
        if dropped > 0 && core.failure.is_none() {
            core.failure = Some(Failure::Interrupted);
        }
        return CoreStep::running(Vec::new());
    }

    info!("shutdown requested; disconnecting workers");
    if core.failure.is_none() {
        core.failure = Some(Failure::Interrupted);
    }
    core.active = None;

    CoreStep::running(begin_disconnect(core))
}

/// Hand queued jobs to every ready, idle worker in id order.
fn schedule(core: &mut PoolCore) -> Vec<PoolCommand> {
    let mut commands = Vec::new();

    for (id, record) in core.workers.iter_mut() {
        if !record.ready || record.busy.is_some() || record.disconnecting {
            continue;
        }
        let Some(file) = core.jobs.pop() else {
            break;
        };
        commands.push(dispatch(*id, record, file, &core.options));
    }

    mark_draining(core);
    commands
}

fn dispatch(id: WorkerId, record: &mut WorkerRecord, file: PathBuf, options: &PoolOptions) -> PoolCommand {
    let dest = destination_for(&file, &options.source_root, &options.output_root);
    debug!(file = ?file, "worker[{id}] building");
    record.busy = Some(file.clone());
    PoolCommand::Send(id, WorkerCommand::Build { file, dest })
}

/// Close out the active batch once the queue is empty and nobody is busy,
/// then start the next deferred batch or disconnect the pool.
fn check_finished(core: &mut PoolCore) -> Vec<PoolCommand> {
    if !is_scheduling(core.state)
        || !core.jobs.is_empty()
        || core.workers.values().any(|r| r.busy.is_some())
    {
        return Vec::new();
    }
    let Some(batch) = core.active.take() else {
        return Vec::new();
    };

    core.state = PoolState::Finished;
    core.summary.batches += 1;
    core.summary.built += batch.built;
    info!(batch = batch.number, built = batch.built, "batch finished");

    let mut commands = vec![PoolCommand::BatchFinished {
        batch: batch.number,
        built: batch.built,
    }];

    match core.deferred.pop() {
        Some(next) => commands.extend(start_batch(core, next)),
        None => commands.extend(begin_disconnect(core)),
    }
    commands
}

fn begin_disconnect(core: &mut PoolCore) -> Vec<PoolCommand> {
    core.state = PoolState::Disconnecting;
    core.jobs.clear();

    let mut commands = Vec::new();
    for (id, record) in core.workers.iter_mut() {
        if !record.disconnecting {
            record.disconnecting = true;
            commands.push(PoolCommand::Disconnect(*id));
        }
    }
    commands
}

fn allocate(core: &mut PoolCore) -> WorkerId {
    let id = WorkerId(core.next_id);
    core.next_id += 1;
    core.workers.insert(id, WorkerRecord::default());
    debug!("worker[{id}] forking.");
    id
}

fn is_scheduling(state: PoolState) -> bool {
    matches!(state, PoolState::Scheduling | PoolState::Draining)
}

/// Scheduling turns into draining once the last job has been handed out.
fn mark_draining(core: &mut PoolCore) {
    if core.state == PoolState::Scheduling && core.jobs.is_empty() {
        debug!("job queue empty; draining");
        core.state = PoolState::Draining;
    }
}

fn all_online(core: &PoolCore) -> bool {
    core.workers
        .values()
        .filter(|r| !r.disconnecting)
        .all(|r| r.online)
}
