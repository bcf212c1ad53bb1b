// src/worker/mod.rs

//! The worker side of the pool.
//!
//! A [`Worker`] owns its own file cache and path cache, reads the batch's
//! files on `start`, and compiles one file per `build`. It is synchronous;
//! the serve loop in [`serve`] drives it from a line-oriented channel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::WorkerOptions;
use crate::deps::FileCache;
use crate::deps::collect::read_files;
use crate::errors::{ClusterError, Result};
use crate::fs::FileSystem;
use crate::protocol::{WorkerCommand, WorkerEvent};
use crate::types::{RebaseMode, WorkerId};

pub mod compiler;
pub mod rebase;
pub mod resolver;
pub mod serve;

pub use compiler::{
    compiler_from_options, CommandCompiler, ImportInliner, ImportResolver, ResolvedImport,
    StylesheetCompiler,
};
pub use resolver::PathResolver;
pub use serve::{serve, serve_stdio};

/// What a successful build did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Written { dest: PathBuf, bytes: usize },
    /// The compiler produced nothing; no file was written.
    Empty,
}

#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    options: WorkerOptions,
    fs: Arc<dyn FileSystem>,
    compiler: Box<dyn StylesheetCompiler>,
    files: FileCache,
    resolver: PathResolver,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        options: WorkerOptions,
        fs: Arc<dyn FileSystem>,
        compiler: Box<dyn StylesheetCompiler>,
    ) -> Self {
        Self {
            id,
            options,
            fs,
            compiler,
            files: FileCache::new(),
            resolver: PathResolver::new(),
        }
    }

    /// Worker using the compiler selected by `options`.
    pub fn with_options(id: WorkerId, options: WorkerOptions, fs: Arc<dyn FileSystem>) -> Self {
        let compiler = compiler_from_options(&options);
        Self::new(id, options, fs, compiler)
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn file_cache(&self) -> &FileCache {
        &self.files
    }

    /// Read `paths` into the file cache.
    pub fn start(&mut self, paths: &[PathBuf]) -> Result<()> {
        let data = read_files(self.fs.as_ref(), paths)?;
        debug!(worker = %self.id, files = data.len(), "cached batch files");
        self.files.merge(data);
        Ok(())
    }

    /// Compile `file` and write the CSS to `dest`.
    pub fn build(&mut self, file: &Path, dest: &Path) -> Result<BuildOutcome> {
        let source = match self.files.get(file) {
            Some(cached) => cached.to_string(),
            None => {
                let content =
                    self.fs
                        .read_to_string(file)
                        .map_err(|source| ClusterError::ReadError {
                            path: file.to_path_buf(),
                            source,
                        })?;
                self.files.insert(file.to_path_buf(), content.clone());
                content
            }
        };

        let base_dir = match self.options.rebase {
            RebaseMode::Source => parent_of(file),
            RebaseMode::Output => parent_of(dest),
        };

        let mut imports = BuildImports {
            fs: self.fs.as_ref(),
            files: &mut self.files,
            resolver: &mut self.resolver,
            search_paths: &self.options.include_paths,
            base_dir,
            relocated: HashSet::new(),
        };
        let css = self.compiler.compile(file, &source, &mut imports)?;

        if css.trim().is_empty() {
            warn!(worker = %self.id, file = ?file, "compiler produced no output; skipping write");
            return Ok(BuildOutcome::Empty);
        }

        self.fs
            .write(dest, css.as_bytes())
            .map_err(|source| ClusterError::WriteError {
                path: dest.to_path_buf(),
                source,
            })?;
        info!(worker = %self.id, "compiled {} -> {}", file.display(), dest.display());

        Ok(BuildOutcome::Written {
            dest: dest.to_path_buf(),
            bytes: css.len(),
        })
    }

    /// Resolve an import specifier the way a build would.
    pub fn resolve_child_path(&mut self, specifier: &str, from_file: &Path) -> Option<PathBuf> {
        self.resolver.resolve_child_path(
            self.fs.as_ref(),
            specifier,
            from_file,
            &self.options.include_paths,
        )
    }

    /// Process one command and produce the event to report.
    pub fn handle(&mut self, command: WorkerCommand) -> WorkerEvent {
        let id = self.id;
        match command {
            WorkerCommand::Start { data } => match self.start(&data) {
                Ok(()) => WorkerEvent::Ready { id },
                Err(err) => WorkerEvent::Error {
                    id,
                    detail: err.to_string(),
                },
            },
            WorkerCommand::Build { file, dest } => match self.build(&file, &dest) {
                Ok(_) => WorkerEvent::Drain {
                    id,
                    file: Some(file),
                },
                Err(err) => WorkerEvent::Error {
                    id,
                    detail: err.to_string(),
                },
            },
        }
    }

    /// Drop all cached state.
    pub fn teardown(&mut self) {
        self.files.clear();
        self.resolver.clear();
    }
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// [`ImportResolver`] handed to the compiler during one build.
struct BuildImports<'a> {
    fs: &'a dyn FileSystem,
    files: &'a mut FileCache,
    resolver: &'a mut PathResolver,
    search_paths: &'a [PathBuf],
    base_dir: PathBuf,
    /// Files whose content was rebased, directly or through an ancestor.
    /// Their own imports are relative to them, not to the root file.
    relocated: HashSet<PathBuf>,
}

impl ImportResolver for BuildImports<'_> {
    fn resolve_import(&mut self, specifier: &str, importer: &Path) -> Result<ResolvedImport> {
        let path = self
            .resolver
            .resolve_child_path(self.fs, specifier, importer, self.search_paths)
            .ok_or_else(|| ClusterError::ResolveError {
                specifier: specifier.to_string(),
                importer: importer.to_path_buf(),
            })?;

        let content = match self.files.get(&path) {
            Some(cached) => cached.to_string(),
            None => {
                let content =
                    self.fs
                        .read_to_string(&path)
                        .map_err(|source| ClusterError::ReadError {
                            path: path.clone(),
                            source,
                        })?;
                self.files.insert(path.clone(), content.clone());
                content
            }
        };

        let rebased = self.resolver.is_rebased(specifier, importer) == Some(true)
            || self.relocated.contains(importer);
        let content = if rebased {
            self.relocated.insert(path.clone());
            rebase::rebase_urls(&content, &parent_of(&path), &self.base_dir).into_owned()
        } else {
            content
        };

        Ok(ResolvedImport { path, content })
    }
}
