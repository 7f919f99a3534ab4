// src/antiraid/allowlist.rs

use std::collections::HashSet;

/// Aktorzy zwolnieni z każdej detekcji w danej gildii.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    actors: HashSet<u64>,
}

impl AllowList {
    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self { actors: ids.into_iter().collect() }
    }

    /// `true` gdy dodano nowy wpis.
    pub fn add(&mut self, actor_id: u64) -> bool {
        self.actors.insert(actor_id)
    }

    pub fn remove(&mut self, actor_id: u64) -> bool {
        self.actors.remove(&actor_id)
    }

    pub fn contains(&self, actor_id: u64) -> bool {
        self.actors.contains(&actor_id)
    }

    /// Posortowane – stabilny wydruk w /antiraid whitelist list.
    pub fn list(&self) -> Vec<u64> {
        let mut v: Vec<u64> = self.actors.iter().copied().collect();
        v.sort_unstable();
        v
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_contains() {
        let mut a = AllowList::from_ids([3, 1]);
        assert!(a.contains(1));
        assert!(!a.add(1));
        assert!(a.add(2));
        assert_eq!(a.list(), vec![1, 2, 3]);
        assert!(a.remove(3));
        assert!(!a.remove(3));
        assert_eq!(a.len(), 2);
    }
}
