// src/deps/mod.rs

//! Dependency tracking between stylesheets.
//!
//! - [`directives`] extracts `@import` directives from source text.
//! - [`graph`] keeps the bidirectional import graph.
//! - [`adhoc`] computes which files to recompile and which to read when only
//!   a subset of the tree was requested.
//! - [`cache`] holds file contents keyed by path.
//! - [`collect`] lists the source directory, reads it, builds the graph and
//!   produces a [`BatchPlan`].

pub mod adhoc;
pub mod cache;
pub mod collect;
pub mod directives;
pub mod graph;

pub use adhoc::{filter_ad_hoc, AdHocSelection};
pub use cache::FileCache;
pub use collect::{BatchPlan, Collector};
pub use directives::{scan_imports, ImportDirective, ImportOption};
pub use graph::ImportGraph;
