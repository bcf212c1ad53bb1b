// src/config/mod.rs

//! Configuration loading and validation for less-cluster.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and the resolved options (`model.rs`).
//! - Load a config file from disk and overlay CLI values (`loader.rs`).
//! - Validate basic invariants like the match pattern (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, resolve_options};
pub use model::{ClusterOptions, ClusterSection, ConfigFile, WorkerOptions, DEFAULT_MATCH};
pub use validate::validate_options;
