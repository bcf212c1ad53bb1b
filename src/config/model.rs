// src/config/model.rs

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::fs::paths::normalize;
use crate::types::{LogLevel, RebaseMode};

/// Glob used to find sources when none is configured.
pub const DEFAULT_MATCH: &str = "**/*.less";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [cluster]
/// directory = "less"
/// output_dir = "public/css"
/// match = "**/*.less"
/// workers = 4
/// include_paths = ["vendor/less"]
/// rebase = "source"
/// compiler = "lessc -"
/// ```
///
/// Every key is optional; CLI flags override file values.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub cluster: ClusterSection,
}

/// `[cluster]` section, also the shape CLI arguments are mapped into.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClusterSection {
    /// Source root to collect from. Default: current directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Output root. Default: `directory`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Glob (relative to `directory`) selecting sources.
    #[serde(default, rename = "match")]
    pub match_pattern: Option<String>,

    /// Number of worker processes; `0` builds in-process.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Extra roots searched for imports after the importer's directory.
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,

    /// Restrict the batch to these files and their dependency closure.
    #[serde(default)]
    pub files: Vec<PathBuf>,

    #[serde(default)]
    pub rebase: Option<RebaseMode>,

    /// External command receiving flattened source on stdin.
    #[serde(default)]
    pub compiler: Option<String>,
}

impl ClusterSection {
    /// Layer `over` on top of `self`: scalar values in `over` win, lists in
    /// `over` replace non-empty lists.
    pub fn overlay(mut self, over: ClusterSection) -> ClusterSection {
        if over.directory.is_some() {
            self.directory = over.directory;
        }
        if over.output_dir.is_some() {
            self.output_dir = over.output_dir;
        }
        if over.match_pattern.is_some() {
            self.match_pattern = over.match_pattern;
        }
        if over.workers.is_some() {
            self.workers = over.workers;
        }
        if !over.include_paths.is_empty() {
            self.include_paths = over.include_paths;
        }
        if !over.files.is_empty() {
            self.files = over.files;
        }
        if over.rebase.is_some() {
            self.rebase = over.rebase;
        }
        if over.compiler.is_some() {
            self.compiler = over.compiler;
        }
        self
    }
}

/// Fully resolved options used by the coordinator.
///
/// All paths are absolute and normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    pub directory: PathBuf,
    pub output_dir: PathBuf,
    pub match_pattern: String,
    pub workers: usize,
    pub include_paths: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub rebase: RebaseMode,
    pub compiler: Option<String>,
    /// Level forwarded to worker processes; `None` lets them read
    /// `LESS_CLUSTER_LOG`.
    pub log_level: Option<LogLevel>,
}

impl ClusterOptions {
    /// Defaults for an absolute source `directory`, output written in place.
    pub fn for_directory(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        Self {
            output_dir: directory.clone(),
            directory,
            match_pattern: DEFAULT_MATCH.to_string(),
            workers: default_workers(),
            include_paths: Vec::new(),
            files: Vec::new(),
            rebase: RebaseMode::default(),
            compiler: None,
            log_level: None,
        }
    }

    /// Resolve a section against `cwd`.
    ///
    /// `directory`, `output_dir` and `include_paths` are relative to `cwd`;
    /// ad-hoc `files` are relative to `directory`. Empty include paths are
    /// dropped.
    pub fn from_section(section: ClusterSection, cwd: &Path) -> Self {
        let directory = absolutize(cwd, section.directory.as_deref().unwrap_or(Path::new(".")));
        let output_dir = section
            .output_dir
            .as_deref()
            .map(|p| absolutize(cwd, p))
            .unwrap_or_else(|| directory.clone());

        let include_paths = section
            .include_paths
            .iter()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| absolutize(cwd, p))
            .collect();

        let files = section
            .files
            .iter()
            .map(|p| absolutize(&directory, p))
            .collect();

        Self {
            directory,
            output_dir,
            match_pattern: section
                .match_pattern
                .unwrap_or_else(|| DEFAULT_MATCH.to_string()),
            workers: section.workers.unwrap_or_else(default_workers),
            include_paths,
            files,
            rebase: section.rebase.unwrap_or_default(),
            compiler: section.compiler,
            log_level: None,
        }
    }

    /// The part of the options each worker needs.
    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            include_paths: self.include_paths.clone(),
            rebase: self.rebase,
            compiler: self.compiler.clone(),
            log_level: self.log_level,
        }
    }
}

/// Options shipped to every worker (as argv flags for worker processes).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerOptions {
    pub include_paths: Vec<PathBuf>,
    pub rebase: RebaseMode,
    pub compiler: Option<String>,
    pub log_level: Option<LogLevel>,
}

impl WorkerOptions {
    /// Render as CLI flags understood by `less-cluster --worker <ID>`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for path in &self.include_paths {
            args.push("--include-path".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        args.push("--rebase".to_string());
        args.push(self.rebase.to_string());
        if let Some(ref compiler) = self.compiler {
            args.push("--compiler".to_string());
            args.push(compiler.clone());
        }
        if let Some(level) = self.log_level {
            args.push("--log-level".to_string());
            args.push(level.to_string());
        }
        args
    }
}

/// One worker per available CPU.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    normalize(&base.join(path))
}
