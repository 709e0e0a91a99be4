//! 🧠 Rolling Memory Window
//!
//! Bounded per-underlying history of (change %, action, timestamp). Feeds the
//! trend-continuity features used by momentum and regime voting. The window is
//! owned by a desk lane, never by a process-wide singleton.

use crate::decision_engine::decision::Action;
use crate::error::InvariantViolation;
use chrono::NaiveDateTime;
use std::collections::VecDeque;

/// Entries kept per underlying
pub const MEMORY_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub change_pct: f64,
    pub action: Action,
    pub timestamp: Option<NaiveDateTime>,
}

/// Fixed-capacity FIFO: append, then evict the oldest when full
#[derive(Debug, Clone, PartialEq)]
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
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, entry: MemoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean change % over the window (None if empty)
    pub fn average_change(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sum: f64 = self.entries.iter().map(|e| e.change_pct).sum();
        Some(sum / self.entries.len() as f64)
    }

    /// Net share of up-moves minus down-moves, in [-1, 1].
    /// 1.0 means every remembered tick moved up.
    pub fn trend_strength(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let net: i64 = self
            .entries
            .iter()
            .map(|e| {
                if e.change_pct > 0.0 {
                    1
                } else if e.change_pct < 0.0 {
                    -1
                } else {
                    0
                }
            })
            .sum();
        net as f64 / self.entries.len() as f64
    }

    pub fn check_capacity(&self) -> Result<(), InvariantViolation> {
        if self.entries.len() > self.capacity {
            return Err(InvariantViolation::MemoryOverCapacity {
                len: self.entries.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}
