use crate::constants::MEMORY_CAPACITY;
use std::collections::VecDeque;

/// A title produced earlier in the run, with the capture date it described.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub title: String,
    pub date: Option<String>,
}

/// Bounded FIFO of recent titles, oldest first.
///
/// Owned by one orchestrator run and handed to the analyzer explicitly.
#[derive(Debug, Clone)]
pub struct MemoryWindow {
    entries: VecDeque<MemoryEntry>,
    capacity: usize,
}

impl Default for MemoryWindow {
    fn default() -> Self {
        Self::with_capacity(MEMORY_CAPACITY)
    }
}

impl MemoryWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, title: impl Into<String>, date: Option<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(MemoryEntry {
            title: title.into(),
            date,
        });
    }

    /// Up to `n` entries, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter().rev().take(n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
