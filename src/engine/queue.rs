// src/engine/queue.rs

use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::debug;

use crate::deps::BatchPlan;

/// Files of the active batch still waiting for a worker, in dispatch order.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: VecDeque<PathBuf>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue contents with a new batch's files.
    pub fn load(&mut self, files: impl IntoIterator<Item = PathBuf>) {
        self.pending = files.into_iter().collect();
    }

    pub fn pop(&mut self) -> Option<PathBuf> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Batches requested while another batch is active.
///
/// Batches are never merged: each one starts, in request order, once the
/// previous batch has fully drained.
#[derive(Debug, Default)]
pub struct BatchQueue {
    batches: VecDeque<BatchPlan>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, plan: BatchPlan) {
        self.batches.push_back(plan);
        debug!(queued = self.batches.len(), "deferred batch until the active one finishes");
    }

    pub fn pop(&mut self) -> Option<BatchPlan> {
        self.batches.pop_front()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Drop every queued batch, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.batches.len();
        self.batches.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(files: &[&str]) -> BatchPlan {
        let files: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
        BatchPlan {
            process: files.clone(),
            read: files,
        }
    }

    #[test]
    fn jobs_come_out_in_load_order() {
        let mut q = JobQueue::new();
        q.load(["/a.less", "/b.less"].map(PathBuf::from));
        assert_eq!(q.pop(), Some(PathBuf::from("/a.less")));
        assert_eq!(q.len(), 1);
        q.load([PathBuf::from("/c.less")]);
        assert_eq!(q.pop(), Some(PathBuf::from("/c.less")));
        assert!(q.is_empty());
    }

    #[test]
    fn batches_stay_separate_and_fifo() {
        let mut q = BatchQueue::new();
        q.push(plan(&["/one.less"]));
        q.push(plan(&["/two.less"]));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().unwrap().process, vec![PathBuf::from("/one.less")]);
        assert_eq!(q.pop().unwrap().process, vec![PathBuf::from("/two.less")]);
        assert!(q.pop().is_none());
    }
}
