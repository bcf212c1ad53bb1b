// src/deps/adhoc.rs

//! Restricting a batch to an ad-hoc subset of files.
//!
//! Recompiling a file means recompiling everything that imports it, directly
//! or not. Compiling any of those needs the full import tree of each one in
//! the workers' caches. The two resulting sets differ: the *process* set is
//! what gets rebuilt, the *read* set is what must be shipped to workers.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::deps::graph::ImportGraph;

/// Result of [`filter_ad_hoc`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdHocSelection {
    /// Files to recompile: the request followed by discovered importers, in
    /// discovery order, without duplicates.
    pub process: Vec<PathBuf>,
    /// Files whose contents must be cached, sorted and unique.
    pub read: Vec<PathBuf>,
}

/// Compute the process and read sets for `requested`.
///
/// For every file in a worklist seeded with `requested`:
/// 1. each importer joins the process set and the worklist, and it goes into
///    the read set together with its importer ancestry;
/// 2. each import goes into the read set with its whole import tree, and so
///    does the importer ancestry of that import;
/// 3. the file itself is always read.
pub fn filter_ad_hoc(graph: &ImportGraph, requested: &[PathBuf]) -> AdHocSelection {
    let mut process: Vec<PathBuf> = Vec::new();
    let mut queued: HashSet<PathBuf> = HashSet::new();
    let mut worklist: VecDeque<PathBuf> = VecDeque::new();
    let mut read: BTreeSet<PathBuf> = BTreeSet::new();

    for file in requested {
        if queued.insert(file.clone()) {
            process.push(file.clone());
            worklist.push_back(file.clone());
        }
    }

    while let Some(file) = worklist.pop_front() {
        if let Some(importers) = graph.importers_of(&file) {
            for importer in importers {
                if queued.insert(importer.clone()) {
                    process.push(importer.clone());
                    worklist.push_back(importer.clone());
                }
                read.insert(importer.clone());
                walk(importer, &mut read, |f| graph.importers_of(f));
            }
        }

        if let Some(children) = graph.imports_of(&file) {
            for child in children {
                read.insert(child.clone());
                walk(child, &mut read, |f| graph.imports_of(f));
                walk(child, &mut read, |f| graph.importers_of(f));
            }
        }

        read.insert(file);
    }

    AdHocSelection {
        process,
        read: read.into_iter().collect(),
    }
}

/// Depth-first walk from `start` along `next`, adding every reached file to
/// `read`. Already-read files are still expanded once per walk, so cycles
/// terminate through the local `seen` set.
fn walk<'g, F>(start: &Path, read: &mut BTreeSet<PathBuf>, next: F)
where
    F: Fn(&Path) -> Option<&'g BTreeSet<PathBuf>>,
{
    let mut stack: Vec<&Path> = vec![start];
    let mut seen: HashSet<&Path> = HashSet::new();

    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        if let Some(neighbours) = next(current) {
            for n in neighbours {
                read.insert(n.clone());
                stack.push(n.as_path());
            }
        }
    }
}
