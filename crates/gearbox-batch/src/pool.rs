//! The pool of work units awaiting dispatch in one scheduling run.

use gearbox_core::batch::BatchMode;
use gearbox_core::ids::ContainerId;
use gearbox_core::work_unit::WorkUnit;
use std::collections::{HashSet, VecDeque};

/// An ordered batch of work units dispatched as one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub index: usize,
    pub units: Vec<WorkUnit>,
}

impl Batch {
    pub fn keys(&self) -> Vec<String> {
        self.units.iter().map(WorkUnit::key).collect()
    }

    pub fn file_count(&self) -> u64 {
        self.units.iter().map(|u| u.file_count).sum()
    }
}

/// FIFO queue of work units. Each unit (by container) appears at most once,
/// and the pool is only ever drained: there is no way to add units after
/// construction.
#[derive(Debug, Default)]
pub struct BatchPool {
    queue: VecDeque<WorkUnit>,
    next_index: usize,
}

impl BatchPool {
    pub fn new(units: impl IntoIterator<Item = WorkUnit>) -> Self {
        let mut seen: HashSet<ContainerId> = HashSet::new();
        let queue = units
            .into_iter()
            .filter(|u| seen.insert(u.container.clone()))
            .collect();
        Self {
            queue,
            next_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the next batch off the front of the pool.
    ///
    /// In `files` mode units without files are dropped, and a batch closes
    /// when the next unit would push its file total past `size`. A single
    /// unit larger than `size` still forms a batch of its own.
    pub fn next_batch(&mut self, mode: BatchMode, size: u64) -> Option<Batch> {
        let mut units = Vec::new();
        match mode {
            BatchMode::Projects => {
                while (units.len() as u64) < size.max(1) {
                    match self.queue.pop_front() {
                        Some(unit) => units.push(unit),
                        None => break,
                    }
                }
            }
            BatchMode::Files => {
                let mut total = 0u64;
                while let Some(unit) = self.queue.front() {
                    if unit.file_count == 0 {
                        self.queue.pop_front();
                        continue;
                    }
                    if !units.is_empty() && total + unit.file_count > size {
                        break;
                    }
                    total += unit.file_count;
                    units.extend(self.queue.pop_front());
                }
            }
        }

        if units.is_empty() {
            return None;
        }
        let batch = Batch {
            index: self.next_index,
            units,
        };
        self.next_index += 1;
        Some(batch)
    }

    /// Drain the whole pool into batches.
    pub fn into_batches(mut self, mode: BatchMode, size: u64) -> Vec<Batch> {
        let mut batches = Vec::new();
        while let Some(batch) = self.next_batch(mode, size) {
            batches.push(batch);
        }
        batches
    }
}
