// src/engine/mod.rs

//! Worker-pool orchestration.
//!
//! This module ties together:
//! - the job queue of the active batch
//! - the queue of batches requested while another one is active
//! - the pool's lifecycle (fork, readiness barrier, scheduling, disconnect)
//! - the main event loop that reacts to:
//!   - batch requests
//!   - worker messages and exits
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::path::PathBuf;

use crate::deps::BatchPlan;
use crate::protocol::WorkerEvent;
use crate::types::WorkerId;

/// Options shared by the core and the async shell.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of workers forked per batch (at least 1).
    pub workers: usize,
    /// Root the processed files are laid out relative to.
    pub source_root: PathBuf,
    /// Root the generated CSS is written under.
    pub output_root: PathBuf,
}

/// Events flowing into the pool from backends, signal handlers, etc.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// Compile this batch, or queue it behind the active one.
    BatchRequested(BatchPlan),
    /// A forked worker is up and can receive commands.
    Online(WorkerId),
    /// A decoded message from a worker.
    Message { id: WorkerId, event: WorkerEvent },
    /// A worker wrote something that is not a valid event.
    Malformed {
        id: WorkerId,
        raw: String,
        reason: String,
    },
    /// A worker exited (or its channel closed).
    Exited { id: WorkerId, code: Option<i32> },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Totals reported when the pool finishes cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub batches: usize,
    pub built: usize,
    pub replaced: usize,
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;

pub use core::{PoolCore, PoolState};
pub use event_handlers::{CoreStep, PoolCommand};
pub use queue::{BatchQueue, JobQueue};
pub use runtime::Pool;
