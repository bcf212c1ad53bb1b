// src/exec/mod.rs

//! Worker execution layer.
//!
//! This module is responsible for actually running workers and carrying the
//! JSON-lines protocol between them and the pool, reporting back via
//! `PoolEvent`s.
//!
//! - [`backend`] provides the `WorkerBackend` trait the pool runtime talks
//!   to, and which tests can replace with a fake implementation.
//! - [`process`] runs each worker as a child process of this executable.
//! - [`in_process`] runs a single worker on a blocking thread, used when
//!   the configured worker count is zero.

pub mod backend;
pub mod in_process;
pub mod process;

pub use backend::{BackendFuture, WorkerBackend};
pub use in_process::InProcessBackend;
pub use process::ProcessBackend;
