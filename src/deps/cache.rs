// src/deps/cache.rs

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

/// In-memory cache of stylesheet contents keyed by absolute path.
///
/// The coordinator fills it from collection; each worker keeps its own,
/// filled by `start`.
#[derive(Debug, Default, Clone)]
pub struct FileCache {
    contents: HashMap<PathBuf, String>,
}

impl FileCache {
    pub fn new() -> Self {
        Self {
            contents: HashMap::new(),
        }
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.contents.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: PathBuf, content: String) {
        self.contents.insert(path, content);
    }

    /// Merge freshly read contents, replacing stale entries.
    pub fn merge(&mut self, data: BTreeMap<PathBuf, String>) {
        debug!(files = data.len(), "merging contents into file cache");
        self.contents.extend(data);
    }

    pub fn clear(&mut self) {
        self.contents.clear();
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}
