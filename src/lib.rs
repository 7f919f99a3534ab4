// src/lib.rs

pub mod antiraid;
pub mod config;
pub mod db;
pub mod discord;
pub mod error;
pub mod logging;
pub mod notify;
pub mod punish;

use anyhow::Result;
use std::{sync::Arc, time::Duration};

use antiraid::AntiRaid;
use config::Settings;
use db::{GuildStore, PgStore, memory::MemoryStore};
use discord::log_sink::LogChannelSink;
use notify::{FanoutSink, NotificationSink, TracingSink};
use punish::ModerationApi;

use serenity::all::{GatewayIntents, Http};

/// Globalny kontekst aplikacji: konfiguracja, magazyn i silnik anty-raid.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub store: Arc<dyn GuildStore>,
    pub engine: Arc<AntiRaid>,
    /// Kanał logów – unieważniany przez zdarzenia kanałów z gatewaya.
    pub log_sink: Option<Arc<LogChannelSink>>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - magazyn (Postgres + migracje albo pamięć, gdy brak URL)
    /// - ujścia alertów (tracing + kanał logów) i silnik anty-raid
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        // 1) logi
        logging::init(&settings);

        // 2) magazyn
        let store: Arc<dyn GuildStore> = if settings.database.url.is_empty() {
            tracing::warn!("database.url is empty, anti-raid settings will not survive a restart");
            Arc::new(MemoryStore::new())
        } else {
            let db = db::connect(&settings.database.url, settings.database.max_connections).await?;
            db::migrate(&db).await?;
            Arc::new(PgStore::new(db))
        };

        // 3) platforma + alerty
        let http = Arc::new(Http::new(&settings.discord.token));
        let api: Arc<dyn ModerationApi> = Arc::new(discord::api::SerenityModeration::new(http.clone()));
        let log_sink = Arc::new(LogChannelSink::new(http, settings.antiraid.log_channel_name.clone()));
        let notifier: Arc<dyn NotificationSink> =
            Arc::new(FanoutSink::new(vec![Arc::new(TracingSink), log_sink.clone()]));

        let mut ctx = Self::from_parts(settings, api, notifier, store);
        ctx.log_sink = Some(log_sink);
        Ok(Arc::new(ctx))
    }

    /// Składanie kontekstu z gotowych zależności (testy, inne transporty).
    pub fn from_parts(
        settings: Settings,
        api: Arc<dyn ModerationApi>,
        notifier: Arc<dyn NotificationSink>,
        store: Arc<dyn GuildStore>,
    ) -> Self {
        let engine = AntiRaid::new(&settings.antiraid, api, notifier, store.clone());
        AntiRaid::spawn_prune_task(
            &engine,
            Duration::from_secs(settings.antiraid.prune_interval_secs.max(1)),
        );
        Self { settings, store, engine, log_sink: None }
    }
}

/// Intents potrzebne silnikowi:
/// - GUILD_MEMBERS (joiny),
/// - GUILD_MESSAGES + MESSAGE_CONTENT (spam, filtry treści).
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
}

/// Start klienta Discorda (Gateway + slash commands).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}
