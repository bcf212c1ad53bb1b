// src/exec/backend.rs

//! Pluggable worker backend abstraction.
//!
//! The pool runtime talks to a `WorkerBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake backend in tests while
//! keeping the production implementations in [`process`](super::process)
//! and [`in_process`](super::in_process).
//!
//! A backend reports everything that happens to its workers (coming online,
//! messages, exits) as `PoolEvent`s on the sender it was built with.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::protocol::WorkerCommand;
use crate::types::WorkerId;

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting how workers are started and addressed.
pub trait WorkerBackend: Send {
    /// Start a worker under `id`.
    ///
    /// The backend must emit `PoolEvent::Online(id)` once the worker can
    /// receive commands, and `PoolEvent::Exited` when it goes away.
    fn fork(&mut self, id: WorkerId) -> BackendFuture<'_>;

    /// Deliver one command to a worker.
    fn send(&mut self, id: WorkerId, command: WorkerCommand) -> BackendFuture<'_>;

    /// Close the worker's command channel so it exits once idle.
    fn disconnect(&mut self, id: WorkerId) -> BackendFuture<'_>;
}
