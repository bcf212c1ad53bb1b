// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::WorkerId;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A source file could not be read into the cache.
    #[error("Read error for {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// An import specifier could not be located on any search path.
    #[error("Cannot resolve import '{specifier}' from {importer:?}")]
    ResolveError { specifier: String, importer: PathBuf },

    /// The stylesheet compiler rejected its input.
    #[error("Compile error in {path:?}: {message}")]
    CompileError { path: PathBuf, message: String },

    /// The generated output could not be written.
    #[error("Write error for {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A message on the coordinator/worker channel was malformed.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("worker[{id}] failed: {detail}")]
    WorkerFailed { id: WorkerId, detail: String },

    #[error("Interrupted before the batch finished")]
    Interrupted,

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ClusterError>;
