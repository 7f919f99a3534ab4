// src/antiraid/window.rs
//! Bounded recency buffer answering "were there ≥ N events within T?".
//!
//! This is a ring buffer, not a time-pruned window: entries only leave when capacity is
//! exceeded. The burst check looks at the `threshold` most recent entries only.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub actor_id: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WindowTracker {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
}

impl WindowTracker {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Dopisuje znacznik czasu; przy pełnym buforze wypada najstarszy.
    pub fn record(&mut self, actor_id: u64, at: DateTime<Utc>) {
        // znaczniki muszą być niemalejące – spóźnione zdarzenie przyklejamy do najnowszego
        let at = match self.entries.back() {
            Some(last) if at < last.at => {
                tracing::debug!(actor_id, %at, newest = %last.at, "out-of-order event clamped");
                last.at
            }
            _ => at,
        };
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(WindowEntry { actor_id, at });
    }

    /// `true` gdy mamy ≥ `threshold` wpisów i rozpiętość `threshold` najnowszych ≤ `interval`.
    pub fn is_burst(&self, threshold: u32, interval: Duration) -> bool {
        let n = threshold as usize;
        let len = self.entries.len();
        if n == 0 || len < n {
            return false;
        }
        let newest = self.entries[len - 1].at;
        let oldest = self.entries[len - n].at;
        newest - oldest <= interval
    }

    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.entries.back().map(|e| e.at)
    }

    /// Ostatnich `n` aktorów (od najnowszego), bez duplikatów – do alertów o raidzie.
    pub fn recent_actors(&self, n: usize) -> Vec<u64> {
        let mut out = Vec::with_capacity(n);
        for e in self.entries.iter().rev() {
            if out.len() >= n {
                break;
            }
            if !out.contains(&e.actor_id) {
                out.push(e.actor_id);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
