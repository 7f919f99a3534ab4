// src/db/mod.rs
//! Trwała konfiguracja anty-raid: polityka gildii (JSONB), allow-lista i audyt kar.

pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serenity::async_trait;
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};

use crate::antiraid::policy::{PolicyConfig, PunishmentKind};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str, max: Option<u32>) -> Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(max.unwrap_or(10))
        .connect(url)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &Db) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Ustawienia gildii zapisywane jako jeden dokument JSONB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    pub policy: PolicyConfig,
    /// Znormalizowane (NFKC + lowercase), dokładane do listy domyślnej z configu.
    pub banned_words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunishmentRecord {
    pub guild_id: u64,
    pub actor_id: u64,
    pub kind: PunishmentKind,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait GuildStore: Send + Sync {
    async fn load_settings(&self, guild_id: u64) -> Result<Option<GuildSettings>>;
    async fn save_settings(&self, guild_id: u64, settings: &GuildSettings) -> Result<()>;
    async fn load_allowlist(&self, guild_id: u64) -> Result<Vec<u64>>;
    async fn allowlist_add(&self, guild_id: u64, actor_id: u64, added_by: Option<u64>) -> Result<()>;
    async fn allowlist_remove(&self, guild_id: u64, actor_id: u64) -> Result<()>;
    async fn record_punishment(&self, record: &PunishmentRecord) -> Result<()>;
}

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GuildStore for PgStore {
    async fn load_settings(&self, guild_id: u64) -> Result<Option<GuildSettings>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT cfg FROM raidguard.guild_settings WHERE guild_id = $1")
                .bind(guild_id as i64)
                .fetch_optional(&self.db)
                .await?;
        match row {
            Some((val,)) => Ok(Some(serde_json::from_value(val)?)),
            None => Ok(None),
        }
    }

    async fn save_settings(&self, guild_id: u64, settings: &GuildSettings) -> Result<()> {
        let cfg = serde_json::to_value(settings)?;
        sqlx::query(
            r#"
            INSERT INTO raidguard.guild_settings (guild_id, cfg, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (guild_id) DO UPDATE SET cfg = EXCLUDED.cfg, updated_at = now()
            "#,
        )
        .bind(guild_id as i64)
        .bind(cfg)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn load_allowlist(&self, guild_id: u64) -> Result<Vec<u64>> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "SELECT actor_id FROM raidguard.allowlist WHERE guild_id = $1 ORDER BY actor_id",
        )
        .bind(guild_id as i64)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id as u64).collect())
    }

    async fn allowlist_add(&self, guild_id: u64, actor_id: u64, added_by: Option<u64>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raidguard.allowlist (guild_id, actor_id, added_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (guild_id, actor_id) DO NOTHING
            "#,
        )
        .bind(guild_id as i64)
        .bind(actor_id as i64)
        .bind(added_by.map(|v| v as i64))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn allowlist_remove(&self, guild_id: u64, actor_id: u64) -> Result<()> {
        sqlx::query("DELETE FROM raidguard.allowlist WHERE guild_id = $1 AND actor_id = $2")
            .bind(guild_id as i64)
            .bind(actor_id as i64)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn record_punishment(&self, record: &PunishmentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raidguard.punishments (guild_id, actor_id, kind, reason, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.guild_id as i64)
        .bind(record.actor_id as i64)
        .bind(record.kind.as_str())
        .bind(&record.reason)
        .bind(record.at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
