//! InMemoryFrontier - lock-free FIFO
//!
//! `crossbeam::queue::SegQueue` は MPMC なので、discovery と retry drain が
//! 同時に offer しても scheduler の poll とぶつかりません。

use crossbeam::queue::SegQueue;

use crate::domain::{CrawlTask, PacerError};
use crate::ports::Frontier;

#[derive(Default)]
pub struct InMemoryFrontier {
    queue: SegQueue<CrawlTask>,
}

impl InMemoryFrontier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Frontier for InMemoryFrontier {
    fn offer(&self, task: CrawlTask) -> Result<(), PacerError> {
        self.queue.push(task);
        Ok(())
    }

    fn poll(&self) -> Result<Option<CrawlTask>, PacerError> {
        Ok(self.queue.pop())
    }

    fn size(&self) -> Result<usize, PacerError> {
        Ok(self.queue.len())
    }
}
