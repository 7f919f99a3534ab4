// src/discord/mod.rs
pub mod api;
pub mod log_sink;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures_util::FutureExt;
use serenity::all::*;
use serenity::async_trait;

use crate::AppContext;
use crate::antiraid::{JoinOutcome, MessageEvent, MessageOutcome, commands};

pub struct Handler {
    pub app: Arc<AppContext>,
}

impl Handler {
    fn forget_log_channel(&self, guild_id: GuildId) {
        if let Some(sink) = &self.app.log_sink {
            sink.invalidate(guild_id.get());
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(guilds = ready.guilds.len(), "Logged in as {}", ready.user.name);
    }

    // _is_new zgodnie z Serenity 0.12
    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let gid = guild.id.get();
        self.app.engine.warmup(gid).await;

        if let Err(e) = commands::register_commands(&ctx, guild.id).await {
            tracing::warn!(error=?e, gid, "register antiraid commands failed");
        }
        tracing::info!(guild=%guild.name, gid, "anti-raid state warmed + commands registered");
    }

    async fn guild_member_addition(&self, _ctx: Context, member: Member) {
        let gid = member.guild_id.get();
        // boty liczą się do okna joinów jak każdy; wyłącza je tylko allow-lista
        let uid = member.user.id.get();
        let at = member
            .joined_at
            .map(|t| *t)
            .unwrap_or_else(Utc::now);
        match self.app.engine.on_actor_joined(gid, uid, at).await {
            JoinOutcome::Recorded | JoinOutcome::Allowed => {}
            outcome => tracing::info!(gid, uid, ?outcome, "JOIN handled"),
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let Some(gid) = msg.guild_id else {
            return;
        };

        let ev = MessageEvent {
            guild_id: gid.get(),
            actor_id: msg.author.id.get(),
            channel_id: msg.channel_id.get(),
            message_id: msg.id.get(),
            content: msg.content.clone(),
            at: *msg.timestamp,
            is_bot: msg.author.bot,
        };
        match self.app.engine.on_message_created(ev).await {
            MessageOutcome::Ignored | MessageOutcome::Allowed | MessageOutcome::Recorded => {}
            outcome => tracing::info!(gid = gid.get(), uid = msg.author.id.get(), ?outcome, "MESSAGE handled"),
        }
    }

    async fn channel_create(&self, _ctx: Context, channel: GuildChannel) {
        self.forget_log_channel(channel.guild_id);
    }

    async fn channel_delete(&self, _ctx: Context, channel: GuildChannel, _messages: Option<Vec<Message>>) {
        self.forget_log_channel(channel.guild_id);
    }

    // zmiana nazwy może dodać albo zabrać #raid-log
    async fn channel_update(&self, _ctx: Context, _old: Option<GuildChannel>, new: GuildChannel) {
        self.forget_log_channel(new.guild_id);
    }

    /// Brama interakcji: /antiraid
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let fut = commands::on_interaction(&ctx, &self.app, interaction);
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            tracing::error!("antiraid interaction handler panicked");
        }
    }
}

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            other => tracing::warn!(intent = other, "unknown gateway intent ignored"),
        }
    }
    if i.is_empty() {
        i = crate::default_gateway_intents();
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Brak tokenu Discord (RAIDGUARD_DISCORD__TOKEN). Uzupełnij w .env.");
    }

    let intents = intents_from_settings(&ctx.settings.discord.intents);
    let handler = Handler { app: ctx.clone() };

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    tracing::info!("Discord client starting…");
    client.start().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_by_name() {
        let i = intents_from_settings(&["GUILDS".into(), "GUILD_MEMBERS".into()]);
        assert!(i.contains(GatewayIntents::GUILD_MEMBERS));
        assert!(!i.contains(GatewayIntents::MESSAGE_CONTENT));
        assert_eq!(intents_from_settings(&[]), crate::default_gateway_intents());
    }
}
