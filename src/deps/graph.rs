// src/deps/graph.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, trace};

use crate::deps::directives::scan_imports;
use crate::fs::FileSystem;
use crate::fs::paths::{resolve, with_source_extension};

/// Bidirectional import graph keyed by absolute path.
///
/// Invariant: `c ∈ imports[p]` if and only if `p ∈ imported_by[c]`.
///
/// A key in `imports` means the file was parsed, even when its set is empty;
/// `imported_by` only holds files with at least one importer.
#[derive(Debug, Default, Clone)]
pub struct ImportGraph {
    /// Files each file references.
    imports: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    /// Files referencing each file.
    imported_by: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `content` of `file` and replace its outgoing edges with the
    /// imports that resolve on `search_paths`.
    ///
    /// The importer's own directory is always searched first. Foreign
    /// imports and unresolvable specifiers produce no edge.
    pub fn parse_imports(
        &mut self,
        fs: &dyn FileSystem,
        file: &Path,
        content: &str,
        search_paths: &[PathBuf],
    ) {
        let children = resolve_import_edges(fs, file, content, search_paths);
        trace!(file = ?file, imports = children.len(), "parsed imports");
        self.set_imports(file, children);
    }

    /// Replace every edge originating at `file` with `children`.
    pub fn set_imports(&mut self, file: &Path, children: BTreeSet<PathBuf>) {
        if let Some(previous) = self.imports.remove(file) {
            for child in previous {
                let now_empty = match self.imported_by.get_mut(&child) {
                    Some(importers) => {
                        importers.remove(file);
                        importers.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.imported_by.remove(&child);
                }
            }
        }

        for child in &children {
            self.imported_by
                .entry(child.clone())
                .or_default()
                .insert(file.to_path_buf());
        }
        self.imports.insert(file.to_path_buf(), children);
    }

    /// Files that `file` imports, or `None` if it was never parsed.
    pub fn imports_of(&self, file: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.imports.get(file)
    }

    /// Files importing `file`, or `None` if nothing imports it.
    pub fn importers_of(&self, file: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.imported_by.get(file)
    }

    pub fn is_parsed(&self, file: &Path) -> bool {
        self.imports.contains_key(file)
    }

    pub fn parsed_files(&self) -> impl Iterator<Item = &Path> {
        self.imports.keys().map(PathBuf::as_path)
    }

    pub fn edge_count(&self) -> usize {
        self.imports.values().map(BTreeSet::len).sum()
    }

    /// Check the reciprocal-edge invariant in both directions.
    pub fn is_symmetric(&self) -> bool {
        let forward = self.imports.iter().all(|(parent, children)| {
            children.iter().all(|child| {
                self.imported_by
                    .get(child)
                    .is_some_and(|importers| importers.contains(parent))
            })
        });
        let backward = self.imported_by.iter().all(|(child, importers)| {
            !importers.is_empty()
                && importers.iter().all(|parent| {
                    self.imports
                        .get(parent)
                        .is_some_and(|children| children.contains(child))
                })
        });
        forward && backward
    }

    /// Return a file that takes part in an import cycle, if any.
    pub fn find_cycle(&self) -> Option<PathBuf> {
        let mut graph: DiGraphMap<&Path, ()> = DiGraphMap::new();
        for (parent, children) in &self.imports {
            graph.add_node(parent.as_path());
            for child in children {
                graph.add_edge(parent.as_path(), child.as_path(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_order) => None,
            Err(cycle) => Some(cycle.node_id().to_path_buf()),
        }
    }
}

/// Resolve the in-domain imports of `file` to existing paths.
///
/// Candidates are probed in order: the importer's directory, then each of
/// `search_paths`; the source extension is appended when missing and the
/// first existing file wins.
pub fn resolve_import_edges(
    fs: &dyn FileSystem,
    file: &Path,
    content: &str,
    search_paths: &[PathBuf],
) -> BTreeSet<PathBuf> {
    let mut children = BTreeSet::new();
    let own_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();

    for directive in scan_imports(content) {
        if directive.is_foreign() {
            debug!(
                file = ?file,
                specifier = directive.specifier,
                "skipping foreign import"
            );
            continue;
        }

        let found = std::iter::once(&own_dir)
            .chain(search_paths.iter())
            .map(|dir| with_source_extension(&resolve(dir, directive.specifier)))
            .find(|candidate| fs.is_file(candidate));

        match found {
            Some(path) => {
                children.insert(path);
            }
            None => {
                debug!(
                    file = ?file,
                    specifier = directive.specifier,
                    "import not found on any search path; no edge recorded"
                );
            }
        }
    }

    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn reparse_replaces_previous_edges() {
        let mut graph = ImportGraph::new();
        graph.set_imports(Path::new("/p.less"), set(&["/a.less", "/b.less"]));
        graph.set_imports(Path::new("/p.less"), set(&["/c.less"]));

        assert_eq!(graph.imports_of(Path::new("/p.less")), Some(&set(&["/c.less"])));
        assert!(graph.importers_of(Path::new("/a.less")).is_none());
        assert!(graph.importers_of(Path::new("/b.less")).is_none());
        assert_eq!(graph.importers_of(Path::new("/c.less")), Some(&set(&["/p.less"])));
        assert!(graph.is_symmetric());
    }

    #[test]
    fn parsed_without_imports_differs_from_never_parsed() {
        let mut graph = ImportGraph::new();
        graph.set_imports(Path::new("/leaf.less"), BTreeSet::new());

        assert!(graph.is_parsed(Path::new("/leaf.less")));
        assert!(!graph.is_parsed(Path::new("/other.less")));
        assert_eq!(graph.imports_of(Path::new("/leaf.less")).map(BTreeSet::len), Some(0));
    }

    #[test]
    fn resolves_against_own_dir_then_search_paths() {
        let fs = MockFileSystem::new();
        fs.add_file("/proj/styles/a.less", "");
        fs.add_file("/proj/shared/mixins.less", "");

        let content = "@import \"a\";\n@import \"mixins.less\";\n@import \"missing\";\n";
        let edges = resolve_import_edges(
            &fs,
            Path::new("/proj/styles/main.less"),
            content,
            &[PathBuf::from("/proj/shared")],
        );

        assert_eq!(edges, set(&["/proj/shared/mixins.less", "/proj/styles/a.less"]));
    }

    #[test]
    fn css_imports_never_become_edges() {
        let fs = MockFileSystem::new();
        fs.add_file("/proj/x.css", "");
        fs.add_file("/proj/x.less", "");

        let mut graph = ImportGraph::new();
        graph.parse_imports(
            &fs,
            Path::new("/proj/main.less"),
            "@import (css) \"x.css\";\n@import (inline) \"x.less\";\n@import \"x.css\";\n",
            &[],
        );

        assert_eq!(graph.edge_count(), 0);
        assert_eq!(
            graph.parsed_files().collect::<Vec<_>>(),
            vec![Path::new("/proj/main.less")]
        );
        assert!(graph.importers_of(Path::new("/proj/x.css")).is_none());
    }

    #[test]
    fn detects_import_cycles() {
        let mut graph = ImportGraph::new();
        graph.set_imports(Path::new("/a.less"), set(&["/b.less"]));
        assert!(graph.find_cycle().is_none());

        graph.set_imports(Path::new("/b.less"), set(&["/a.less"]));
        assert!(graph.find_cycle().is_some());
    }
}
