// src/discord/log_sink.rs
//! Alerty jako embed na kanale logów gildii (domyślnie `#raid-log`).

use std::sync::Arc;

use dashmap::DashMap;
use serenity::all::{
    ChannelId, ChannelType, Colour, CreateEmbed, CreateEmbedFooter, CreateMessage, GuildId, Http, Timestamp,
};
use serenity::async_trait;

use crate::notify::{Notification, NotificationKind, NotificationSink};

const SYSTEM_NAME: &str = "Tigris Security System™ • Anti-Raid";

/// guild → kanał logów. Trzymamy tylko trafienia: gildia bez kanału jest sprawdzana
/// przy każdym alercie, więc kanał założony później od razu zaczyna dostawać alerty.
#[derive(Default)]
struct ChannelCache(DashMap<u64, ChannelId>);

impl ChannelCache {
    fn get(&self, guild_id: u64) -> Option<ChannelId> {
        self.0.get(&guild_id).map(|c| *c)
    }

    fn remember(&self, guild_id: u64, found: Option<ChannelId>) {
        match found {
            Some(channel) => {
                self.0.insert(guild_id, channel);
            }
            None => {
                self.0.remove(&guild_id);
            }
        }
    }

    fn forget(&self, guild_id: u64) {
        self.0.remove(&guild_id);
    }
}

pub struct LogChannelSink {
    http: Arc<Http>,
    channel_name: String,
    channels: ChannelCache,
}

impl LogChannelSink {
    pub fn new(http: Arc<Http>, channel_name: impl Into<String>) -> Self {
        Self {
            http,
            channel_name: channel_name.into(),
            channels: ChannelCache::default(),
        }
    }

    /// Zapomnij kanał gildii (create/delete/update kanału, nieudana wysyłka).
    pub fn invalidate(&self, guild_id: u64) {
        self.channels.forget(guild_id);
    }

    async fn resolve(&self, guild_id: u64) -> Option<ChannelId> {
        if let Some(c) = self.channels.get(guild_id) {
            return Some(c);
        }
        let found = match GuildId::new(guild_id).channels(&self.http).await {
            Ok(map) => map
                .values()
                .find(|c| c.kind == ChannelType::Text && c.name == self.channel_name)
                .map(|c| c.id),
            Err(e) => {
                tracing::warn!(error=?e, guild_id, "failed to list channels for log sink");
                return None;
            }
        };
        if found.is_none() {
            tracing::debug!(guild_id, channel = %self.channel_name, "no log channel in guild");
        }
        self.channels.remember(guild_id, found);
        found
    }
}

fn colour_for(kind: &NotificationKind) -> Colour {
    match kind {
        NotificationKind::RaidModeActivated { .. } => Colour::RED,
        NotificationKind::RaidModeDeactivated { .. } => Colour::DARK_GREEN,
        NotificationKind::Punished { .. } => Colour::ORANGE,
        NotificationKind::PunishmentFailed { .. } => Colour::DARK_RED,
        NotificationKind::SpamWarning { .. } | NotificationKind::MessageFiltered { .. } => Colour::GOLD,
    }
}

fn title_for(kind: &NotificationKind) -> &'static str {
    match kind {
        NotificationKind::RaidModeActivated { .. } => "🚨 Raid mode activated",
        NotificationKind::RaidModeDeactivated { .. } => "✅ Raid mode deactivated",
        NotificationKind::Punished { .. } => "🔨 Anti-Raid punishment",
        NotificationKind::PunishmentFailed { .. } => "⚠️ Punishment failed",
        NotificationKind::SpamWarning { .. } => "💬 Spam warning",
        NotificationKind::MessageFiltered { .. } => "🧹 Message filtered",
    }
}

pub fn build_embed(n: &Notification) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(title_for(&n.kind))
        .description(n.describe())
        .colour(colour_for(&n.kind))
        .footer(CreateEmbedFooter::new(SYSTEM_NAME));
    if let Ok(ts) = Timestamp::from_unix_timestamp(n.at.timestamp()) {
        embed = embed.timestamp(ts);
    }
    if let Some(actor) = n.actor {
        embed = embed.field("Member", format!("<@{actor}> (`{actor}`)"), true);
    }
    if !n.reason.is_empty() {
        embed = embed.field("Reason", n.reason.clone(), true);
    }
    if let NotificationKind::RaidModeActivated { recent_joiners, .. } = &n.kind {
        if !recent_joiners.is_empty() {
            let list = recent_joiners
                .iter()
                .map(|id| format!("<@{id}>"))
                .collect::<Vec<_>>()
                .join(", ");
            embed = embed.field("Recent joins", list, false);
        }
    }
    embed
}

#[async_trait]
impl NotificationSink for LogChannelSink {
    async fn emit(&self, guild_id: u64, notification: Notification) {
        let Some(channel) = self.resolve(guild_id).await else {
            return;
        };
        let msg = CreateMessage::new().embed(build_embed(&notification));
        if let Err(e) = channel.send_message(&self.http, msg).await {
            tracing::warn!(error=?e, guild_id, channel_id = channel.get(), "failed to post alert to log channel");
            self.invalidate(guild_id);
        }
    }
}
