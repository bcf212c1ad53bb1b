#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use less_cluster::config::ClusterOptions;
use less_cluster::deps::{BatchPlan, ImportGraph};
use less_cluster::fs::mock::MockFileSystem;
use less_cluster::types::RebaseMode;

/// Builder for `ClusterOptions` rooted at an absolute directory.
pub struct OptionsBuilder {
    options: ClusterOptions,
}

impl OptionsBuilder {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            options: ClusterOptions::for_directory(directory),
        }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.output_dir = dir.into();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.options.workers = n;
        self
    }

    pub fn include_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.include_paths.push(dir.into());
        self
    }

    /// Ad-hoc file, relative to the directory.
    pub fn file(mut self, rel: &str) -> Self {
        let path = self.options.directory.join(rel);
        self.options.files.push(path);
        self
    }

    pub fn rebase(mut self, mode: RebaseMode) -> Self {
        self.options.rebase = mode;
        self
    }

    pub fn build(self) -> ClusterOptions {
        self.options
    }
}

/// Builder for `ImportGraph` from explicit edges.
#[derive(Default)]
pub struct GraphBuilder {
    edges: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` imports `to` (both marked as parsed).
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.edges.entry(PathBuf::from(from)).or_default().insert(PathBuf::from(to));
        self.edges.entry(PathBuf::from(to)).or_default();
        self
    }

    /// A parsed file without imports.
    pub fn leaf(mut self, file: &str) -> Self {
        self.edges.entry(PathBuf::from(file)).or_default();
        self
    }

    pub fn build(self) -> ImportGraph {
        let mut graph = ImportGraph::new();
        for (file, children) in self.edges {
            graph.set_imports(&file, children);
        }
        graph
    }
}

/// In-memory tree from `(path, content)` pairs.
pub fn mock_tree(files: &[(&str, &str)]) -> MockFileSystem {
    let fs = MockFileSystem::new();
    for (path, content) in files {
        fs.add_file(path, *content);
    }
    fs
}

/// A plan that processes and reads exactly `files`.
pub fn plan_of(files: &[&str]) -> BatchPlan {
    let files: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
    BatchPlan {
        process: files.clone(),
        read: files,
    }
}

pub fn paths(files: &[&str]) -> Vec<PathBuf> {
    files.iter().map(|f| Path::new(f).to_path_buf()).collect()
}
