// src/antiraid/warnings.rs
//! Per-user spam warning counters. Each detected burst adds one; reaching the limit means
//! punishment and the counter goes back to zero. Counters never expire with time.

use std::collections::HashMap;

/// Ile wykrytych burstów do kary.
pub const WARNINGS_BEFORE_PUNISHMENT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Ostrzeżenie `count`/`limit` (usuń wiadomość + tymczasowy komunikat).
    Warn { count: u32, limit: u32 },
    /// Limit osiągnięty – licznik już wyzerowany.
    Punish,
}

#[derive(Debug, Clone, Default)]
pub struct WarningLedger {
    counts: HashMap<u64, u32>,
}

impl WarningLedger {
    pub fn escalate(&mut self, actor_id: u64) -> Escalation {
        let count = self.counts.entry(actor_id).or_insert(0);
        *count = count.saturating_add(1);
        if *count >= WARNINGS_BEFORE_PUNISHMENT {
            self.reset(actor_id);
            Escalation::Punish
        } else {
            Escalation::Warn { count: *count, limit: WARNINGS_BEFORE_PUNISHMENT }
        }
    }

    /// Idempotentne.
    pub fn reset(&mut self, actor_id: u64) {
        self.counts.remove(&actor_id);
    }

    pub fn count(&self, actor_id: u64) -> u32 {
        self.counts.get(&actor_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
