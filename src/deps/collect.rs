// src/deps/collect.rs

//! Directory collection: list, read, parse, filter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};

use crate::config::ClusterOptions;
use crate::deps::adhoc::{filter_ad_hoc, AdHocSelection};
use crate::deps::cache::FileCache;
use crate::deps::graph::ImportGraph;
use crate::errors::{ClusterError, Result};
use crate::fs::FileSystem;
use crate::fs::paths::{destination_for, relative_str};

/// What one batch compiles and what its workers must read first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// Files to compile, in dispatch order.
    pub process: Vec<PathBuf>,
    /// Files every worker caches before building (`start` payload).
    pub read: Vec<PathBuf>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.process.is_empty()
    }
}

impl From<AdHocSelection> for BatchPlan {
    fn from(sel: AdHocSelection) -> Self {
        Self {
            process: sel.process,
            read: sel.read,
        }
    }
}

/// Coordinator-owned store of the import graph and the file cache.
///
/// Each instance is isolated; nothing here is process-global.
#[derive(Debug)]
pub struct Collector {
    options: ClusterOptions,
    fs: Arc<dyn FileSystem>,
    graph: ImportGraph,
    cache: FileCache,
}

impl Collector {
    pub fn new(options: ClusterOptions, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            options,
            fs,
            graph: ImportGraph::new(),
            cache: FileCache::new(),
        }
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    pub fn graph(&self) -> &ImportGraph {
        &self.graph
    }

    pub fn file_cache(&self) -> &FileCache {
        &self.cache
    }

    /// Output path for a source file under the configured output root.
    pub fn destination_for(&self, file: &Path) -> PathBuf {
        destination_for(file, &self.options.directory, &self.options.output_dir)
    }

    /// List every source under the configured directory.
    pub fn list_sources(&self) -> Result<Vec<PathBuf>> {
        self.list_sources_in(&self.options.directory)
    }

    /// List every file under `dir` matching the configured pattern.
    pub fn list_sources_in(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let matcher = build_matcher(&self.options.match_pattern)?;
        list_matching(self.fs.as_ref(), dir, &matcher)
    }

    /// Collect the configured directory into a [`BatchPlan`].
    pub fn collect(&mut self) -> Result<BatchPlan> {
        let dir = self.options.directory.clone();
        self.collect_in(&dir)
    }

    /// List and read `dir`, merge the contents into the cache, parse imports
    /// of the files just read and plan the batch.
    ///
    /// Without ad-hoc `files` every file read is processed; otherwise the
    /// plan is the ad-hoc closure of those files.
    pub fn collect_in(&mut self, dir: &Path) -> Result<BatchPlan> {
        let matches = self.list_sources_in(dir)?;
        let data = read_files(self.fs.as_ref(), &matches)?;
        let files_read: Vec<PathBuf> = data.keys().cloned().collect();
        info!(dir = ?dir, files = files_read.len(), "collected sources");

        self.cache.merge(data);

        // Only parse what was just read, not the entire cache.
        for file in &files_read {
            if let Some(content) = self.cache.get(file) {
                self.graph
                    .parse_imports(self.fs.as_ref(), file, content, &self.options.include_paths);
            }
        }

        if let Some(cycle) = self.graph.find_cycle() {
            warn!(file = ?cycle, "import cycle detected");
        }

        if self.options.files.is_empty() {
            return Ok(BatchPlan {
                process: files_read.clone(),
                read: files_read,
            });
        }

        let plan = BatchPlan::from(self.filter_ad_hoc(&self.options.files));
        debug!(
            process = plan.process.len(),
            read = plan.read.len(),
            "restricted batch to ad-hoc files"
        );
        Ok(plan)
    }

    pub fn filter_ad_hoc(&self, requested: &[PathBuf]) -> AdHocSelection {
        filter_ad_hoc(&self.graph, requested)
    }
}

/// Compile the single `match` pattern into a matcher.
pub fn build_matcher(pattern: &str) -> Result<GlobSet> {
    let glob = Glob::new(pattern)
        .map_err(|e| ClusterError::ConfigError(format!("invalid match pattern {pattern}: {e}")))?;
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    builder
        .build()
        .map_err(|e| ClusterError::ConfigError(format!("invalid match pattern {pattern}: {e}")))
}

/// Collect all files under `root` whose root-relative path matches, sorted.
pub fn list_matching(fs: &dyn FileSystem, root: &Path, matcher: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs.read_dir(&dir).map_err(|source| ClusterError::ReadError {
            path: dir.clone(),
            source,
        })?;
        for path in entries {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Some(rel) = relative_str(root, &path) {
                    if matcher.is_match(&rel) {
                        files.push(path);
                    }
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Read every path, failing on the first unreadable one.
pub fn read_files(fs: &dyn FileSystem, paths: &[PathBuf]) -> Result<BTreeMap<PathBuf, String>> {
    let mut data = BTreeMap::new();
    for path in paths {
        let content = fs.read_to_string(path).map_err(|source| ClusterError::ReadError {
            path: path.clone(),
            source,
        })?;
        data.insert(path.clone(), content);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn options(files: &[&str]) -> ClusterOptions {
        let mut opts = ClusterOptions::for_directory("/proj");
        opts.files = files.iter().map(PathBuf::from).collect();
        opts
    }

    fn fixture() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file("/proj/a.less", ".a { color: red; }\n");
        fs.add_file("/proj/b.less", "@import \"a.less\";\n.b { color: blue; }\n");
        fs.add_file("/proj/plain.css", "body {}\n");
        fs.add_file("/proj/nested/c.less", "@import (css) \"x.css\";\n");
        fs
    }

    #[test]
    fn full_collection_processes_everything_read() {
        let mut collector = Collector::new(options(&[]), Arc::new(fixture()));
        let plan = collector.collect().unwrap();

        let expected = vec![
            PathBuf::from("/proj/a.less"),
            PathBuf::from("/proj/b.less"),
            PathBuf::from("/proj/nested/c.less"),
        ];
        assert_eq!(plan.read, expected);
        assert_eq!(plan.process, expected);
        assert_eq!(collector.file_cache().len(), 3);
        assert!(collector.graph().is_symmetric());
    }

    #[test]
    fn ad_hoc_request_pulls_in_importers() {
        let mut collector = Collector::new(options(&["/proj/a.less"]), Arc::new(fixture()));
        let plan = collector.collect().unwrap();

        let both = vec![PathBuf::from("/proj/a.less"), PathBuf::from("/proj/b.less")];
        assert_eq!(plan.process, both);
        assert_eq!(plan.read, both);
    }

    #[test]
    fn css_import_target_never_planned() {
        let mut collector = Collector::new(options(&["/proj/nested/c.less"]), Arc::new(fixture()));
        let plan = collector.collect().unwrap();

        assert_eq!(plan.process, vec![PathBuf::from("/proj/nested/c.less")]);
        assert_eq!(plan.read, vec![PathBuf::from("/proj/nested/c.less")]);
    }

    #[test]
    fn destination_swaps_extension_under_output_root() {
        let mut opts = options(&[]);
        opts.output_dir = PathBuf::from("/out");
        let collector = Collector::new(opts, Arc::new(fixture()));

        assert_eq!(
            collector.destination_for(Path::new("/proj/nested/c.less")),
            PathBuf::from("/out/nested/c.css")
        );
    }

    #[test]
    fn unreadable_directory_is_a_read_error() {
        let collector = Collector::new(ClusterOptions::for_directory("/missing"), Arc::new(fixture()));
        assert!(matches!(
            collector.list_sources(),
            Err(ClusterError::ReadError { .. })
        ));
    }
}
