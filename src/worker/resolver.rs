// src/worker/resolver.rs

//! Import specifier resolution with per-worker memoization.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::fs::FileSystem;
use crate::fs::paths::{has_extension, resolve, with_source_extension, SOURCE_EXTENSION};

/// Cache key: the importer's directory plus the raw specifier.
///
/// Two importers in the same directory share entries; the same specifier
/// written in different directories is resolved separately.
type Key = (PathBuf, String);

/// Resolves import specifiers to existing files and remembers the answers.
///
/// Owned by a single worker and never shared.
#[derive(Debug, Default)]
pub struct PathResolver {
    paths: HashMap<Key, PathBuf>,
    rebased: HashMap<Key, bool>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `specifier` as written in `from_file`.
    ///
    /// A cached answer is returned without touching the filesystem. On a
    /// miss the importer's directory is probed first, then `search_paths`
    /// in order; the first existing candidate wins. A hit found outside the
    /// importer's directory is recorded as rebased.
    pub fn resolve_child_path(
        &mut self,
        fs: &dyn FileSystem,
        specifier: &str,
        from_file: &Path,
        search_paths: &[PathBuf],
    ) -> Option<PathBuf> {
        let own_dir = from_file.parent().map(Path::to_path_buf).unwrap_or_default();
        let key = (own_dir.clone(), specifier.to_string());

        if let Some(hit) = self.paths.get(&key) {
            return Some(hit.clone());
        }

        let roots = std::iter::once(&own_dir).chain(search_paths.iter());
        for (index, root) in roots.enumerate() {
            for candidate in candidates(root, specifier) {
                if fs.is_file(&candidate) {
                    trace!(specifier, resolved = ?candidate, rebased = index > 0, "resolved import");
                    self.rebased.insert(key.clone(), index > 0);
                    self.paths.insert(key, candidate.clone());
                    return Some(candidate);
                }
            }
        }

        None
    }

    /// Whether a previously resolved specifier was found outside the
    /// importer's directory.
    pub fn is_rebased(&self, specifier: &str, from_file: &Path) -> Option<bool> {
        let own_dir = from_file.parent().map(Path::to_path_buf).unwrap_or_default();
        self.rebased.get(&(own_dir, specifier.to_string())).copied()
    }

    pub fn cached_len(&self) -> usize {
        self.paths.len()
    }

    /// Seed the cache, as if `specifier` had been resolved from `from_file`.
    pub fn prime(&mut self, specifier: &str, from_file: &Path, resolved: PathBuf, rebased: bool) {
        let own_dir = from_file.parent().map(Path::to_path_buf).unwrap_or_default();
        let key = (own_dir, specifier.to_string());
        self.rebased.insert(key.clone(), rebased);
        self.paths.insert(key, resolved);
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.rebased.clear();
    }
}

/// Files to probe for `specifier` under `root`.
///
/// A specifier carrying a foreign extension (`x.css`) is tried verbatim
/// before the source extension is appended.
fn candidates(root: &Path, specifier: &str) -> Vec<PathBuf> {
    let raw = resolve(root, specifier);
    let with_ext = with_source_extension(&raw);
    if raw.extension().is_some() && !has_extension(&raw, SOURCE_EXTENSION) {
        vec![raw, with_ext]
    } else {
        vec![with_ext]
    }
}
