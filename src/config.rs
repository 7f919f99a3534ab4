// src/config.rs

use anyhow::Result;
use serde::{Deserialize, Serialize};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::antiraid::policy::PolicyConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub database: Database,
    pub logging: Logging,
    pub antiraid: AntiRaidConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Database {
    /// Pusty URL = bez bazy (MemoryStore).
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub json: Option<bool>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AntiRaidConfig {
    /// Polityka gildii bez zapisanej konfiguracji.
    pub defaults: PolicyConfig,
    pub log_channel_name: String,
    pub mute_role_name: String,
    pub ban_purge_days: u8,
    pub warning_ttl_secs: u64,
    pub banned_words: Vec<String>,
    pub block_links: bool,
    pub allowed_link_domains: Vec<String>,
    pub prune_interval_secs: u64,
}

impl Default for AntiRaidConfig {
    fn default() -> Self {
        Self {
            defaults: PolicyConfig::default(),
            log_channel_name: "raid-log".into(),
            mute_role_name: "Muted".into(),
            ban_purge_days: 1,
            warning_ttl_secs: 5,
            banned_words: vec![],
            block_links: true,
            allowed_link_domains: vec![],
            prune_interval_secs: 300,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let env = std::env::var("RAIDGUARD_ENV").unwrap_or_else(|_| "development".to_string());

        // .env.<env> i .env (jeśli są)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        let defaults = Settings {
            env: env.clone(),
            app: App {
                name: "Tigris RaidGuard".into(),
            },
            discord: Discord {
                token: "".into(),
                intents: vec![
                    "GUILDS".into(),
                    "GUILD_MEMBERS".into(),
                    "GUILD_MESSAGES".into(),
                    "MESSAGE_CONTENT".into(),
                ],
            },
            database: Database {
                url: "".into(),
                max_connections: Some(10),
            },
            logging: Logging {
                json: Some(false),
                level: Some("info".into()),
            },
            antiraid: AntiRaidConfig::default(),
        };

        // Warstwy: domyślne -> plik TOML -> zmienne RAIDGUARD_* (RAIDGUARD_DISCORD__TOKEN => discord.token)
        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(format!("config/{}.toml", env)))
            .merge(Env::prefixed("RAIDGUARD_").ignore(&["env"]).split("__"));

        let mut s: Settings = figment.extract()?;
        s.env = env;
        s.normalize()?;
        Ok(s)
    }

    /// Walidacja i przycięcie wartości, których nie da się wyrazić typem.
    pub fn normalize(&mut self) -> Result<()> {
        self.antiraid.defaults.validate()?;
        self.antiraid.ban_purge_days = self.antiraid.ban_purge_days.min(7);
        self.antiraid.warning_ttl_secs = self.antiraid.warning_ttl_secs.max(1);
        self.antiraid.prune_interval_secs = self.antiraid.prune_interval_secs.max(1);
        if self.database.max_connections.is_none() {
            self.database.max_connections = Some(10);
        }
        Ok(())
    }
}
