// src/punish.rs
//! Wykonanie kary (kick / ban / mute) na platformie. Błędy platformy nigdy nie wychodzą
//! poza dispatcher: są logowane i zamieniane w powiadomienie.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::async_trait;
use tokio::sync::OnceCell;

use crate::{
    antiraid::policy::PunishmentKind,
    db::{GuildStore, PunishmentRecord},
    error::ModerationError,
    notify::{Notification, NotificationKind, NotificationSink},
};

/// Odebrane uprawnienia na kanale dla roli wyciszenia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDeny {
    pub send: bool,
    pub react: bool,
    pub speak: bool,
}

impl ChannelDeny {
    pub const MUTED: Self = Self { send: true, react: true, speak: true };
}

/// Akcje moderacyjne platformy. Implementacja produkcyjna: `discord::api::SerenityModeration`.
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn kick(&self, guild_id: u64, actor_id: u64, reason: &str) -> Result<(), ModerationError>;
    async fn ban(
        &self,
        guild_id: u64,
        actor_id: u64,
        reason: &str,
        purge_days: u8,
    ) -> Result<(), ModerationError>;
    /// Id roli o tej nazwie; tworzy ją, jeśli nie istnieje.
    async fn ensure_role(&self, guild_id: u64, name: &str) -> Result<u64, ModerationError>;
    async fn guild_channels(&self, guild_id: u64) -> Result<Vec<u64>, ModerationError>;
    async fn set_channel_permission(
        &self,
        channel_id: u64,
        role_id: u64,
        deny: ChannelDeny,
    ) -> Result<(), ModerationError>;
    async fn add_role(
        &self,
        guild_id: u64,
        actor_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<(), ModerationError>;
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ModerationError>;
    /// Wysyła wiadomość i usuwa ją po `ttl` (w tle, bez blokowania wołającego).
    async fn send_transient(&self, channel_id: u64, text: &str, ttl: Duration) -> Result<(), ModerationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PunishmentOutcome {
    Applied,
    Failed(ModerationError),
}

impl PunishmentOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

pub struct PunishmentDispatcher {
    api: Arc<dyn ModerationApi>,
    notifier: Arc<dyn NotificationSink>,
    store: Arc<dyn GuildStore>,
    mute_role_name: String,
    ban_purge_days: u8,
    /// Rola wyciszenia per gildia: tworzona i rozpropagowana najwyżej raz.
    mute_roles: DashMap<u64, Arc<OnceCell<u64>>>,
}

impl PunishmentDispatcher {
    pub fn new(
        api: Arc<dyn ModerationApi>,
        notifier: Arc<dyn NotificationSink>,
        store: Arc<dyn GuildStore>,
        mute_role_name: impl Into<String>,
        ban_purge_days: u8,
    ) -> Self {
        Self {
            api,
            notifier,
            store,
            mute_role_name: mute_role_name.into(),
            ban_purge_days: ban_purge_days.min(7),
            mute_roles: DashMap::new(),
        }
    }

    pub async fn apply(
        &self,
        guild_id: u64,
        actor_id: u64,
        kind: PunishmentKind,
        reason: &str,
        now: DateTime<Utc>,
    ) -> PunishmentOutcome {
        let res = match kind {
            PunishmentKind::Kick => self.api.kick(guild_id, actor_id, reason).await,
            PunishmentKind::Ban => self.api.ban(guild_id, actor_id, reason, self.ban_purge_days).await,
            PunishmentKind::Mute => self.mute(guild_id, actor_id, reason).await,
        };

        match res {
            Ok(()) => {
                tracing::info!(guild_id, actor_id, kind = %kind, reason, "punishment applied");
                let record = PunishmentRecord {
                    guild_id,
                    actor_id,
                    kind,
                    reason: reason.to_string(),
                    at: now,
                };
                if let Err(e) = self.store.record_punishment(&record).await {
                    tracing::warn!(error = ?e, guild_id, actor_id, "failed to store punishment record");
                }
                self.notifier
                    .emit(
                        guild_id,
                        Notification::new(NotificationKind::Punished { punishment: kind }, Some(actor_id), reason, now),
                    )
                    .await;
                PunishmentOutcome::Applied
            }
            Err(e) => {
                if e.is_permission_like() {
                    tracing::warn!(error = %e, guild_id, actor_id, kind = %kind, "punishment rejected by platform");
                } else {
                    tracing::error!(error = %e, guild_id, actor_id, kind = %kind, "punishment failed");
                }
                self.notifier
                    .emit(
                        guild_id,
                        Notification::new(
                            NotificationKind::PunishmentFailed { punishment: kind, error: e.to_string() },
                            Some(actor_id),
                            reason,
                            now,
                        ),
                    )
                    .await;
                PunishmentOutcome::Failed(e)
            }
        }
    }

    async fn mute(&self, guild_id: u64, actor_id: u64, reason: &str) -> Result<(), ModerationError> {
        let cell = self.mute_roles.entry(guild_id).or_default().clone();
        let role_id = *cell
            .get_or_try_init(|| self.provision_mute_role(guild_id))
            .await?;
        let res = self.api.add_role(guild_id, actor_id, role_id, reason).await;
        if matches!(res, Err(ModerationError::NotFound)) {
            // rolę ktoś usunął – następny mute utworzy ją od nowa
            self.mute_roles.remove(&guild_id);
        }
        res
    }

    async fn provision_mute_role(&self, guild_id: u64) -> Result<u64, ModerationError> {
        let role_id = self.api.ensure_role(guild_id, &self.mute_role_name).await?;
        let channels = self.api.guild_channels(guild_id).await?;
        for channel_id in channels {
            if let Err(e) = self
                .api
                .set_channel_permission(channel_id, role_id, ChannelDeny::MUTED)
                .await
            {
                tracing::warn!(error = %e, guild_id, channel_id, role_id, "could not restrict muted role on channel");
            }
        }
        tracing::info!(guild_id, role_id, "mute role provisioned");
        Ok(role_id)
    }
}
