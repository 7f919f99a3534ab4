// src/db/memory.rs
//! Magazyn w pamięci: gdy `database.url` jest pusty oraz w testach.

use std::collections::BTreeSet;

use anyhow::Result;
use dashmap::DashMap;
use serenity::async_trait;

use super::{GuildSettings, GuildStore, PunishmentRecord};

#[derive(Default)]
pub struct MemoryStore {
    settings: DashMap<u64, GuildSettings>,
    allowlists: DashMap<u64, BTreeSet<u64>>,
    punishments: DashMap<u64, Vec<PunishmentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn punishments(&self, guild_id: u64) -> Vec<PunishmentRecord> {
        self.punishments
            .get(&guild_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GuildStore for MemoryStore {
    async fn load_settings(&self, guild_id: u64) -> Result<Option<GuildSettings>> {
        Ok(self.settings.get(&guild_id).map(|s| s.clone()))
    }

    async fn save_settings(&self, guild_id: u64, settings: &GuildSettings) -> Result<()> {
        self.settings.insert(guild_id, settings.clone());
        Ok(())
    }

    async fn load_allowlist(&self, guild_id: u64) -> Result<Vec<u64>> {
        Ok(self
            .allowlists
            .get(&guild_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn allowlist_add(&self, guild_id: u64, actor_id: u64, _added_by: Option<u64>) -> Result<()> {
        self.allowlists.entry(guild_id).or_default().insert(actor_id);
        Ok(())
    }

    async fn allowlist_remove(&self, guild_id: u64, actor_id: u64) -> Result<()> {
        if let Some(mut set) = self.allowlists.get_mut(&guild_id) {
            set.remove(&actor_id);
        }
        Ok(())
    }

    async fn record_punishment(&self, record: &PunishmentRecord) -> Result<()> {
        self.punishments.entry(record.guild_id).or_default().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allowlist_round_trip_is_sorted_and_deduplicated() {
        let store = MemoryStore::new();
        store.allowlist_add(1, 30, None).await.unwrap();
        store.allowlist_add(1, 10, Some(99)).await.unwrap();
        store.allowlist_add(1, 30, None).await.unwrap();
        assert_eq!(store.load_allowlist(1).await.unwrap(), vec![10, 30]);
        store.allowlist_remove(1, 30).await.unwrap();
        assert_eq!(store.load_allowlist(1).await.unwrap(), vec![10]);
        assert!(store.load_allowlist(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_settings_are_none() {
        let store = MemoryStore::new();
        assert!(store.load_settings(5).await.unwrap().is_none());
        let s = GuildSettings::default();
        store.save_settings(5, &s).await.unwrap();
        assert_eq!(store.load_settings(5).await.unwrap(), Some(s));
    }
}
