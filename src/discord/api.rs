// src/discord/api.rs
//! `ModerationApi` na serenity `Http`.

use std::{sync::Arc, time::Duration};

use serenity::all::{
    ChannelId, EditRole, GuildId, Http, MessageId, PermissionOverwrite, PermissionOverwriteType,
    Permissions, RoleId, UserId,
};
use serenity::async_trait;
use serenity::http::HttpError;

use crate::error::ModerationError;
use crate::punish::{ChannelDeny, ModerationApi};

pub struct SerenityModeration {
    http: Arc<Http>,
}

impl SerenityModeration {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

/// 403 / błędy modelu (hierarchia, brak uprawnień) → PermissionDenied, 404 → NotFound.
pub fn map_error(e: serenity::Error) -> ModerationError {
    match e {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => match resp.status_code.as_u16() {
            403 => ModerationError::PermissionDenied,
            404 => ModerationError::NotFound,
            code => ModerationError::Platform(format!("HTTP {code}: {}", resp.error.message)),
        },
        serenity::Error::Model(_) => ModerationError::PermissionDenied,
        other => ModerationError::Platform(other.to_string()),
    }
}

fn deny_bits(deny: ChannelDeny) -> Permissions {
    let mut p = Permissions::empty();
    if deny.send {
        p |= Permissions::SEND_MESSAGES;
    }
    if deny.react {
        p |= Permissions::ADD_REACTIONS;
    }
    if deny.speak {
        p |= Permissions::SPEAK;
    }
    p
}

#[async_trait]
impl ModerationApi for SerenityModeration {
    async fn kick(&self, guild_id: u64, actor_id: u64, reason: &str) -> Result<(), ModerationError> {
        GuildId::new(guild_id)
            .kick_with_reason(&self.http, UserId::new(actor_id), &format!("Anti-Raid: {reason}"))
            .await
            .map_err(map_error)
    }

    async fn ban(
        &self,
        guild_id: u64,
        actor_id: u64,
        reason: &str,
        purge_days: u8,
    ) -> Result<(), ModerationError> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(actor_id), purge_days.min(7), format!("Anti-Raid: {reason}"))
            .await
            .map_err(map_error)
    }

    async fn ensure_role(&self, guild_id: u64, name: &str) -> Result<u64, ModerationError> {
        let gid = GuildId::new(guild_id);
        let roles = gid.roles(&self.http).await.map_err(map_error)?;
        if let Some(role) = roles.values().find(|r| r.name == name) {
            return Ok(role.id.get());
        }
        let role = gid
            .create_role(&self.http, EditRole::new().name(name).permissions(Permissions::empty()))
            .await
            .map_err(map_error)?;
        tracing::info!(guild_id, role_id = role.id.get(), name, "role created");
        Ok(role.id.get())
    }

    async fn guild_channels(&self, guild_id: u64) -> Result<Vec<u64>, ModerationError> {
        let channels = GuildId::new(guild_id).channels(&self.http).await.map_err(map_error)?;
        Ok(channels.keys().map(|c| c.get()).collect())
    }

    async fn set_channel_permission(
        &self,
        channel_id: u64,
        role_id: u64,
        deny: ChannelDeny,
    ) -> Result<(), ModerationError> {
        ChannelId::new(channel_id)
            .create_permission(
                &self.http,
                PermissionOverwrite {
                    allow: Permissions::empty(),
                    deny: deny_bits(deny),
                    kind: PermissionOverwriteType::Role(RoleId::new(role_id)),
                },
            )
            .await
            .map_err(map_error)
    }

    async fn add_role(
        &self,
        guild_id: u64,
        actor_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<(), ModerationError> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(actor_id),
                RoleId::new(role_id),
                Some(&format!("Anti-Raid: {reason}")),
            )
            .await
            .map_err(map_error)
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ModerationError> {
        ChannelId::new(channel_id)
            .delete_message(&self.http, MessageId::new(message_id))
            .await
            .map_err(map_error)
    }

    async fn send_transient(&self, channel_id: u64, text: &str, ttl: Duration) -> Result<(), ModerationError> {
        let channel = ChannelId::new(channel_id);
        let msg = channel.say(&self.http, text).await.map_err(map_error)?;
        let http = self.http.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = channel.delete_message(&http, msg.id).await {
                match map_error(e) {
                    ModerationError::NotFound => {}
                    other => tracing::debug!(error = %other, channel_id, "transient message not removed"),
                }
            }
        });
        Ok(())
    }
}
